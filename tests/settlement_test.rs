use promise_out::{Error, Failure, Promise};
use std::{
    cell::{Cell, RefCell},
    error::Error as _,
    rc::Rc,
};

#[derive(Debug, thiserror::Error)]
#[error("disk full")]
struct DiskFull;

#[test]
fn test_callback_fault_carries_last_cause_and_all_callbacks_run() {
    let promise = Promise::<u32>::new();
    let flags: Vec<Rc<Cell<bool>>> = (0..3).map(|_| Rc::new(Cell::new(false))).collect();

    let first = flags[0].clone();
    let second = flags[1].clone();
    let third = flags[2].clone();
    promise
        .then(move |_| {
            first.set(true);
            Err::<(), _>("first")
        })
        .unwrap()
        .then(move |_| {
            second.set(true);
            Err::<(), _>(Failure::new(DiskFull))
        })
        .unwrap()
        .finally(move || third.set(true))
        .unwrap();

    let error = promise.complete(1).unwrap_err();
    assert!(flags.iter().all(|flag| flag.get()));
    let cause = error.source().expect("fault keeps its cause");
    assert_eq!(cause.to_string(), "disk full");
    match error {
        Error::CallbackExecution(failure) => assert!(failure.is::<DiskFull>()),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_status_queries_are_exclusive() {
    let pending = Promise::<()>::new();
    let succeeded = Promise::from_value(());
    let failed = Promise::<()>::from_failure("nope");

    let states = |p: &Promise<()>| (p.is_pending(), p.has_succeeded(), p.has_exception());
    assert_eq!(states(&pending), (true, false, false));
    assert_eq!(states(&succeeded), (false, true, false));
    assert_eq!(states(&failed), (false, false, true));
}

#[test]
fn test_fail_runs_catch_then_finally_and_shares_failure() {
    let promise = Promise::<String>::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::new(RefCell::new(Vec::new()));

    for name in ["catch-1", "catch-2"] {
        let order = order.clone();
        let seen = seen.clone();
        promise
            .catch(move |failure| {
                order.borrow_mut().push(name);
                seen.borrow_mut().push(failure.clone());
            })
            .unwrap();
    }
    let finally_order = order.clone();
    promise
        .finally(move || finally_order.borrow_mut().push("finally"))
        .unwrap()
        .then::<_, ()>(|_| panic!("success callback on a failed promise"))
        .unwrap();

    promise.fail(Failure::new(DiskFull)).unwrap();
    assert_eq!(*order.borrow(), ["catch-1", "catch-2", "finally"]);
    let seen = seen.borrow();
    assert!(seen[0].ptr_eq(&seen[1]));
    assert!(seen[0].ptr_eq(&promise.failure().unwrap()));
}

#[test]
fn test_clones_share_one_state() {
    let producer = Promise::<i32>::new();
    let consumer = producer.clone();
    assert_eq!(producer.id(), consumer.id());
    producer.complete(5).unwrap();
    assert_eq!(consumer.value(), Some(5));
    assert!(matches!(
        consumer.complete(6),
        Err(Error::InvalidState { operation: "complete" })
    ));
}

#[test]
fn test_callbacks_registered_during_settlement_run_immediately() {
    let promise = Promise::<i32>::new();
    let late = Rc::new(Cell::new(0));
    let (handle, observer) = (promise.clone(), late.clone());
    promise
        .then(move |_| {
            handle.then(move |value| observer.set(*value)).map(|_| ())
        })
        .unwrap();
    promise.complete(8).unwrap();
    assert_eq!(late.get(), 8);
}

#[test]
fn test_outcome_reports_terminal_state() {
    use promise_out::Outcome;

    assert!(matches!(Promise::from_value(1).outcome(), Some(Outcome::Succeeded(1))));
    assert!(matches!(
        Promise::<u8>::from_failure("x").outcome(),
        Some(Outcome::Failed(_))
    ));
    assert!(Promise::<u8>::new().outcome().is_none());
}
