//! Callback based promises with explicit, cooperative cancellation.
//!
//! A [`Promise`] is settled exactly once by whoever produces the result;
//! consumers register callbacks with [`Promise::then`], [`Promise::catch`] and
//! [`Promise::finally`]. A [`CancelablePromise`] adds a third terminal state
//! driven by a shared [`CancelSignal`], and [`Chaining`] decides how promises
//! derived from it relate to its signal.
//!
//! Nothing here runs work. Promises only sequence notifications about work
//! finished elsewhere; the [`bridge`] and [`remote`] modules connect them to
//! futures and to producers on other threads.
//!
//! ```
//! use promise_out::{combine, CancelablePromise, Promise};
//!
//! let a = Promise::<i32>::new();
//! let b = Promise::<&str>::new();
//! let both = combine((&a, &b));
//!
//! b.complete("x").unwrap();
//! a.complete(1).unwrap();
//! assert_eq!(both.value(), Some((1, "x")));
//!
//! let download = CancelablePromise::<Vec<u8>>::new();
//! let size = download.transform(|bytes| bytes.len());
//! size.cancel().unwrap();
//! assert!(download.is_canceled());
//! ```
//!
//! Callbacks are never optional, so a missing callback does not compile:
//!
//! ```compile_fail
//! use promise_out::Promise;
//! let promise = Promise::<()>::new();
//! promise.then(None);
//! ```
use thiserror::Error;

#[cfg(feature = "bridge")]
pub mod bridge;
mod cancelable;
mod combinators;
mod failure;
mod promise;
#[cfg(feature = "bridge")]
pub mod remote;
mod signal;
mod transform;

pub use cancelable::{CancelablePromise, Chaining};
pub use combinators::{all, any, combine, combine_all, Combine};
pub use failure::{CallbackOutput, Failure};
pub use promise::{Outcome, Promise, PromiseId};
pub use signal::CancelSignal;
pub use transform::{Chain, ContinueOptions};

#[derive(Error, Debug)]
pub enum Error {
    /// `complete`, `fail` or `cancel` on a promise that already settled.
    #[error("cannot {operation} a promise that is no longer pending")]
    InvalidState { operation: &'static str },
    /// One or more callbacks failed while a promise settled; this is the last
    /// of those failures.
    #[error("callback failed during settlement: {0}")]
    CallbackExecution(#[source] Failure),
    #[error("promise failed: {0}")]
    Failed(#[source] Failure),
    #[error("promise was canceled")]
    Canceled,
    /// The producer went away without settling.
    #[error("producer dropped before settling the promise")]
    Abandoned,
    #[error("no promise completed successfully ({} failed)", .0.len())]
    AllFailed(Vec<Failure>),
}
