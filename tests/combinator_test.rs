use promise_out::{all, any, combine, combine_all, CancelablePromise, Error, Promise};

#[test]
fn test_combine_shape_follows_position_not_timing() {
    let in_order = {
        let (a, b, c) = (Promise::<i32>::new(), Promise::<i32>::new(), Promise::<&str>::new());
        let combined = combine((&a, &b, &c));
        a.complete(1).unwrap();
        b.complete(2).unwrap();
        c.complete("x").unwrap();
        combined.value()
    };
    let reversed = {
        let (a, b, c) = (Promise::<i32>::new(), Promise::<i32>::new(), Promise::<&str>::new());
        let combined = combine((&a, &b, &c));
        c.complete("x").unwrap();
        b.complete(2).unwrap();
        a.complete(1).unwrap();
        combined.value()
    };
    assert_eq!(in_order, Some((1, 2, "x")));
    assert_eq!(reversed, in_order);
}

#[test]
fn test_combine_fails_on_first_failure() {
    let (a, b) = (Promise::<i32>::new(), Promise::<String>::new());
    let combined = combine((&a, &b));
    b.fail("b failed").unwrap();
    a.fail("a failed").unwrap();
    assert_eq!(combined.failure().unwrap().to_string(), "b failed");
}

#[test]
fn test_all_is_unaffected_by_settlement_order() {
    let promises: Vec<Promise<()>> = (0..4).map(|_| Promise::new()).collect();
    let output = all(&promises);
    for promise in promises.iter().rev() {
        assert!(output.is_pending());
        promise.complete(()).unwrap();
    }
    assert!(output.has_succeeded());
}

#[test]
fn test_all_ignores_settlements_after_failure() {
    let (a, b, c) = (Promise::<i32>::new(), Promise::new(), Promise::new());
    let output = all([&a, &b, &c]);
    a.fail("first").unwrap();
    b.complete(2).unwrap();
    c.fail("second").unwrap();
    assert_eq!(output.failure().unwrap().to_string(), "first");
}

#[test]
fn test_any_succeeds_even_if_others_fail_later() {
    let (a, b, c) = (Promise::<i32>::new(), Promise::new(), Promise::new());
    let output = any([&a, &b, &c]);
    b.complete(2).unwrap();
    a.fail("a").unwrap();
    c.fail("c").unwrap();
    assert_eq!(output.value(), Some(2));
}

#[test]
fn test_any_with_pending_remainder_stays_pending() {
    let (a, b, c) = (Promise::<i32>::new(), Promise::new(), Promise::new());
    let output = any([&a, &b, &c]);
    a.fail("a").unwrap();
    b.fail("b").unwrap();
    assert!(output.is_pending());
    c.fail("c").unwrap();
    let failure = output.failure().unwrap();
    assert!(matches!(
        failure.downcast_ref::<Error>(),
        Some(Error::AllFailed(failures)) if failures.len() == 3
    ));
}

#[test]
fn test_combinators_accept_cancelable_inputs() {
    let a = CancelablePromise::<u8>::new();
    let b = CancelablePromise::<u8>::new();
    let values = combine_all([&a, &b]);
    let pair = combine((a.promise(), b.promise()));
    b.complete(2).unwrap();
    a.complete(1).unwrap();
    assert_eq!(values.value(), Some(vec![1, 2]));
    assert_eq!(pair.value(), Some((1, 2)));
}

#[test]
fn test_combine_all_over_already_settled_inputs() {
    let inputs = vec![Promise::from_value('a'), Promise::from_value('b')];
    assert_eq!(combine_all(&inputs).value(), Some(vec!['a', 'b']));
}
