//! Promises that aggregate the settlement of several input promises.
//!
//! Each output promise keeps a settlement counter (and, for the combining
//! forms, a buffer of results by input position) shared with the callbacks it
//! registers on its inputs. Once the output has settled, later input
//! settlements are observed and ignored.
use crate::{promise::wire, Error, Failure, Promise};
use std::{
    cell::{Cell, RefCell},
    mem,
    rc::Rc,
};

fn fail_first<T>(output: &Promise<T>, failure: &Failure) -> Result<(), Error> {
    if output.is_pending() {
        output.fail(failure.clone())
    } else {
        Ok(())
    }
}

fn collect<T, I, P>(promises: I) -> Vec<Promise<T>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Promise<T>>,
{
    promises
        .into_iter()
        .map(|promise| promise.as_ref().clone())
        .collect()
}

/// Succeeds once every input has succeeded and fails with the first input
/// failure. With no inputs it succeeds immediately.
pub fn all<T, I, P>(promises: I) -> Promise<()>
where
    T: 'static,
    I: IntoIterator<Item = P>,
    P: AsRef<Promise<T>>,
{
    let promises = collect(promises);
    let output = Promise::new();
    if promises.is_empty() {
        wire(output.complete(()));
        return output;
    }

    let remaining = Rc::new(Cell::new(promises.len()));
    for promise in &promises {
        let failed = output.clone();
        wire(promise.catch(move |failure| fail_first(&failed, failure)));

        let succeeded = output.clone();
        let remaining = remaining.clone();
        wire(promise.then(move |_| {
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 && succeeded.is_pending() {
                succeeded.complete(())
            } else {
                Ok(())
            }
        }));
    }
    output
}

/// Succeeds with the first input value to arrive. Fails with
/// [`Error::AllFailed`] only once every input has failed; with no inputs it
/// never settles.
pub fn any<T, I, P>(promises: I) -> Promise<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = P>,
    P: AsRef<Promise<T>>,
{
    let promises = collect(promises);
    let output = Promise::new();
    let remaining = Rc::new(Cell::new(promises.len()));
    let failures = Rc::new(RefCell::new(vec![None; promises.len()]));

    for (index, promise) in promises.iter().enumerate() {
        let succeeded = output.clone();
        wire(promise.then(move |value: &T| {
            if succeeded.is_pending() {
                succeeded.complete(value.clone())
            } else {
                Ok(())
            }
        }));

        let failed = output.clone();
        let remaining = remaining.clone();
        let failures = failures.clone();
        wire(promise.catch(move |failure| {
            failures.borrow_mut()[index] = Some(failure.clone());
            remaining.set(remaining.get() - 1);
            if remaining.get() > 0 || !failed.is_pending() {
                return Ok(());
            }
            let failures = mem::take(&mut *failures.borrow_mut());
            failed.fail(Error::AllFailed(failures.into_iter().flatten().collect()))
        }));
    }
    output
}

/// Succeeds with every input value, in input order, once all inputs have
/// succeeded; fails with the first input failure. With no inputs it succeeds
/// immediately with an empty `Vec`.
pub fn combine_all<T, I, P>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = P>,
    P: AsRef<Promise<T>>,
{
    let promises = collect(promises);
    let output = Promise::new();
    if promises.is_empty() {
        wire(output.complete(Vec::new()));
        return output;
    }

    let remaining = Rc::new(Cell::new(promises.len()));
    let results = Rc::new(RefCell::new(vec![None; promises.len()]));
    for (index, promise) in promises.iter().enumerate() {
        let failed = output.clone();
        wire(promise.catch(move |failure| fail_first(&failed, failure)));

        let succeeded = output.clone();
        let remaining = remaining.clone();
        let results = results.clone();
        wire(promise.then(move |value: &T| {
            results.borrow_mut()[index] = Some(value.clone());
            remaining.set(remaining.get() - 1);
            if remaining.get() > 0 || !succeeded.is_pending() {
                return Ok(());
            }
            let results = mem::take(&mut *results.borrow_mut());
            succeeded.complete(results.into_iter().flatten().collect())
        }));
    }
    output
}

/// A fixed set of promises with possibly different value types.
///
/// Implemented for tuples of two to six promise references.
pub trait Combine {
    type Output;

    fn combine(self) -> Promise<Self::Output>;
}

/// Succeeds with a tuple of the input values, positioned as the inputs are,
/// once all have succeeded; fails with the first input failure.
///
/// ```
/// use promise_out::{combine, Promise};
///
/// let id = Promise::<u32>::new();
/// let name = Promise::<String>::new();
/// let user = combine((&id, &name));
///
/// name.complete("ada".into()).unwrap();
/// id.complete(7).unwrap();
/// assert_eq!(user.value(), Some((7, "ada".to_string())));
/// ```
pub fn combine<C: Combine>(promises: C) -> Promise<C::Output> {
    promises.combine()
}

macro_rules! combine_tuple {
    ($count:expr; $($ty:ident $value:ident $index:tt),+) => {
        impl<'a, $($ty: Clone + 'static),+> Combine for ($(&'a Promise<$ty>,)+) {
            type Output = ($($ty,)+);

            fn combine(self) -> Promise<Self::Output> {
                let output = Promise::new();
                let remaining = Rc::new(Cell::<usize>::new($count));
                let results = Rc::new(RefCell::new(($(Option::<$ty>::None,)+)));

                // Runs once the last input has stored its value.
                let finish: Rc<dyn Fn() -> Result<(), Error>> = {
                    let output = output.clone();
                    let results = results.clone();
                    Rc::new(move || {
                        if !output.is_pending() {
                            return Ok(());
                        }
                        let taken = mem::take(&mut *results.borrow_mut());
                        match taken {
                            ($(Some($value),)+) => output.complete(($($value,)+)),
                            _ => Ok(()),
                        }
                    })
                };

                $({
                    let failed = output.clone();
                    wire(self.$index.catch(move |failure| fail_first(&failed, failure)));

                    let remaining = remaining.clone();
                    let results = results.clone();
                    let finish = finish.clone();
                    wire(self.$index.then(move |value: &$ty| {
                        results.borrow_mut().$index = Some(value.clone());
                        remaining.set(remaining.get() - 1);
                        if remaining.get() > 0 {
                            return Ok(());
                        }
                        finish()
                    }));
                })+
                output
            }
        }
    };
}

combine_tuple!(2; A a 0, B b 1);
combine_tuple!(3; A a 0, B b 1, C c 2);
combine_tuple!(4; A a 0, B b 1, C c 2, D d 3);
combine_tuple!(5; A a 0, B b 1, C c 2, D d 3, E e 4);
combine_tuple!(6; A a 0, B b 1, C c 2, D d 3, E e 4, F f 5);
