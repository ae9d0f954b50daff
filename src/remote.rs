//! A thread-safe, single-use producer handle paired with a future.
//!
//! Promises live on one thread. Work finishing on another thread reports
//! through a [`Resolver`]; the owning thread awaits the matching [`Pending`],
//! usually by handing it to [`crate::bridge::from_future`].
//!
//! ```
//! use futures::executor::block_on;
//! use promise_out::{bridge, remote};
//! use std::thread;
//!
//! let (resolver, pending) = remote::channel::<String>();
//! let worker = thread::spawn(move || resolver.resolve("done".into()));
//!
//! let (promise, driver) = bridge::from_future(pending);
//! block_on(driver).unwrap();
//! worker.join().unwrap();
//! assert_eq!(promise.value(), Some("done".to_string()));
//! ```
use crate::{Error, Failure, Outcome};
use std::{
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

/// Settles the paired [`Pending`]. Dropping it unsettled makes the pending
/// side fail with [`Error::Abandoned`].
#[derive(Debug)]
pub struct Resolver<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

/// Resolves to the outcome reported through the paired [`Resolver`].
#[derive(Debug)]
pub struct Pending<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Shared<T> {
    outcome: Option<Outcome<T>>,
    waker: Result<Waker, WakerState>,
}

pub fn channel<T>() -> (Resolver<T>, Pending<T>) {
    let shared = Arc::new(Mutex::new(Shared {
        outcome: None,
        waker: Err(WakerState::Fresh),
    }));
    (
        Resolver {
            shared: shared.clone(),
        },
        Pending { shared },
    )
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Resolver<T> {
    pub fn resolve(self, value: T) {
        self.settle(Outcome::Succeeded(value));
    }

    pub fn reject(self, failure: impl Into<Failure>) {
        self.settle(Outcome::Failed(failure.into()));
    }

    pub fn cancel(self) {
        self.settle(Outcome::Canceled);
    }

    fn settle(&self, outcome: Outcome<T>) {
        lock(&self.shared).outcome = Some(outcome);
        if let Ok(waker) = self.taint() {
            waker.wake();
        }
    }

    /// Marks the producer side as gone and hands back whatever waker was
    /// parked.
    fn taint(&self) -> Result<Waker, WakerState> {
        mem::replace(&mut lock(&self.shared).waker, Err(WakerState::Tainted))
    }
}

impl<T> Drop for Resolver<T> {
    /// If this is an unsettled resolver, wake the consumer so it sees the
    /// abandonment.
    fn drop(&mut self) {
        match self.taint() {
            Err(WakerState::Tainted) => {}
            Err(WakerState::Fresh) => tracing::debug!("resolver dropped without settling"),
            Ok(waker) => {
                tracing::debug!("resolver dropped without settling");
                waker.wake();
            }
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = lock(&self.shared);
        if let Some(outcome) = shared.outcome.take() {
            return Poll::Ready(outcome);
        }
        match mem::replace(&mut shared.waker, Ok(cx.waker().clone())) {
            Err(WakerState::Tainted) => Poll::Ready(Outcome::Failed(Error::Abandoned.into())),
            _ => Poll::Pending,
        }
    }
}
