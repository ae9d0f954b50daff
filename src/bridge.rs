//! Adapters between promises and `std::future`.
//!
//! [`Promise::settled`] awaits a promise. [`from_future`] and
//! [`cancelable_from_future`] go the other way: they hand out a promise and a
//! [`Driver`] future which, once spawned on the thread that owns the promise,
//! settles it with whatever the wrapped future yields.
//!
//! ```
//! use futures::executor::LocalPool;
//! use futures::task::LocalSpawnExt;
//! use promise_out::bridge;
//!
//! let mut pool = LocalPool::new();
//! let (promise, driver) = bridge::from_future(async { Ok::<_, String>(3) });
//! let doubled = promise.transform(|n| n * 2);
//!
//! pool.spawner()
//!     .spawn_local(async move { driver.await.unwrap() })
//!     .unwrap();
//! let value = pool.run_until(doubled.settled()).unwrap();
//! assert_eq!(value, 6);
//! ```
use crate::{
    promise::{wire, Callback},
    CancelablePromise, Error, Outcome, Promise,
};
use futures::{
    future::{self, Either, LocalBoxFuture},
    FutureExt,
};
use std::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

struct Slot<T> {
    result: Option<Result<T, Error>>,
    waker: Option<Waker>,
}

/// Resolves to how a promise settled.
///
/// The future does not keep the promise alive; if every handle to a pending
/// promise is dropped it resolves to [`Error::Abandoned`].
pub struct Settled<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> fmt::Debug for Settled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled")
            .field("ready", &self.slot.borrow().result.is_some())
            .finish()
    }
}

/// Owned by the promise's callback list. Dropped unused means the promise went
/// away while pending.
struct Delivery<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Delivery<T> {
    fn deliver(&self, result: Result<T, Error>) {
        let waker = {
            let mut slot = self.slot.borrow_mut();
            if slot.result.is_some() {
                return;
            }
            slot.result = Some(result);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T> Drop for Delivery<T> {
    fn drop(&mut self) {
        self.deliver(Err(Error::Abandoned));
    }
}

impl<T> Future for Settled<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.result.take() {
            Some(result) => Poll::Ready(result),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// A future resolving to the value, or to [`Error::Failed`] or
    /// [`Error::Canceled`].
    pub fn settled(&self) -> Settled<T> {
        let slot = Rc::new(RefCell::new(Slot {
            result: None,
            waker: None,
        }));
        let delivery = Delivery { slot: slot.clone() };
        let promise = self.downgrade();
        wire(self.subscribe(Callback::Settled(Box::new(move || {
            if let Some(outcome) = promise.upgrade().and_then(|promise| promise.outcome()) {
                delivery.deliver(outcome.into_result());
            }
            Ok(())
        }))));
        Settled { slot }
    }
}

/// Settles a promise from a wrapped future. Resolves to the result of the
/// settlement, so failures raised by the promise's callbacks surface here.
#[must_use = "a driver does nothing unless polled"]
pub struct Driver {
    inner: LocalBoxFuture<'static, Result<(), Error>>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}

impl Future for Driver {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

/// A promise settled by `future`. A canceled outcome fails the promise with
/// [`Error::Canceled`].
pub fn from_future<T, F>(future: F) -> (Promise<T>, Driver)
where
    T: 'static,
    F: Future + 'static,
    F::Output: Into<Outcome<T>>,
{
    let promise = Promise::new();
    let target = promise.clone();
    let inner = async move {
        match future.await.into() {
            Outcome::Succeeded(value) => target.complete(value),
            Outcome::Failed(failure) => target.fail(failure),
            Outcome::Canceled => target.fail(Error::Canceled),
        }
    };
    (
        promise,
        Driver {
            inner: inner.boxed_local(),
        },
    )
}

/// A cancelable promise settled by `future`.
///
/// If the promise settles first, for instance because it was canceled, the
/// driver drops `future` and resolves to `Ok(())`.
pub fn cancelable_from_future<T, F>(future: F) -> (CancelablePromise<T>, Driver)
where
    T: 'static,
    F: Future + 'static,
    F::Output: Into<Outcome<T>>,
{
    let promise = CancelablePromise::new();
    let target = promise.clone();
    let stop = Promise::<()>::new();
    let notify = stop.clone();
    wire(promise.finally(move || notify.complete(())));

    let inner = async move {
        match future::select(Box::pin(future), stop.settled()).await {
            Either::Left((output, _)) => match output.into() {
                Outcome::Succeeded(value) => target.complete(value),
                Outcome::Failed(failure) => target.fail(failure),
                Outcome::Canceled => target.cancel(),
            },
            Either::Right(_) => {
                tracing::trace!(promise = %target.id(), "promise settled first, dropping its future");
                Ok(())
            }
        }
    };
    (
        promise,
        Driver {
            inner: inner.boxed_local(),
        },
    )
}
