//! Promises with a third terminal state, canceled, driven by a [`CancelSignal`].
//!
//! Which signal a promise listens to decides how cancellation travels between
//! promises: two promises on one signal cancel each other, and a promise
//! linked to another's signal is canceled by it but not the other way round.
//! No promise keeps references to its relatives for this.
use crate::{
    promise::{wire, Callback, Terminal},
    CallbackOutput, CancelSignal, Error, Failure, Promise,
};
use std::{fmt, ops::Deref};

/// How a promise derived from a cancelable source relates to the source's
/// cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chaining {
    /// Both promises share one signal: canceling either cancels both.
    #[default]
    CancelAll,
    /// The derived promise also observes the source's signal: canceling the
    /// source cancels it, canceling it leaves the source alone.
    CancelChildren,
    /// Independent signals.
    DontChain,
}

/// A [`Promise`] that can also be canceled.
///
/// Dereferences to the underlying [`Promise`] for status queries, settling and
/// value access.
///
/// ```
/// use promise_out::{CancelablePromise, Chaining};
///
/// let parent = CancelablePromise::<()>::new();
/// let child = parent
///     .continue_with_options(
///         |_| CancelablePromise::<()>::new(),
///         promise_out::ContinueOptions::new().chaining(Chaining::CancelChildren),
///     )
///     .unwrap();
///
/// child.cancel().unwrap();
/// assert!(parent.is_pending());
///
/// let child = CancelablePromise::<()>::linked(parent.signal());
/// parent.cancel().unwrap();
/// assert!(child.is_canceled());
/// ```
pub struct CancelablePromise<T> {
    promise: Promise<T>,
    signal: CancelSignal,
}

impl<T> Clone for CancelablePromise<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            signal: self.signal.clone(),
        }
    }
}

impl<T> fmt::Debug for CancelablePromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelablePromise")
            .field("promise", &self.promise)
            .field("signal", &self.signal)
            .finish()
    }
}

impl<T> Deref for CancelablePromise<T> {
    type Target = Promise<T>;

    fn deref(&self) -> &Promise<T> {
        &self.promise
    }
}

impl<T> AsRef<Promise<T>> for CancelablePromise<T> {
    fn as_ref(&self) -> &Promise<T> {
        &self.promise
    }
}

impl<T: 'static> Default for CancelablePromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> CancelablePromise<T> {
    /// A promise with its own signal.
    pub fn new() -> Self {
        Self::with_signal(CancelSignal::new())
    }

    /// A promise on `signal`, which may be shared with other promises. If the
    /// signal was already requested the promise starts out canceled.
    pub fn with_signal(signal: CancelSignal) -> Self {
        let this = Self {
            promise: Promise::new(),
            signal,
        };
        wire(this.observe(&this.signal, None));
        this
    }

    /// A promise with its own signal that is also canceled when `parent` is
    /// requested.
    pub fn linked(parent: &CancelSignal) -> Self {
        let this = Self::new();
        wire(this.observe(parent, Some(this.signal.clone())));
        this
    }

    /// A promise that relates to `signal` as `chaining` describes.
    pub(crate) fn chained(signal: &CancelSignal, chaining: Chaining) -> Self {
        match chaining {
            Chaining::CancelAll => Self::with_signal(signal.clone()),
            Chaining::CancelChildren => Self::linked(signal),
            Chaining::DontChain => Self::new(),
        }
    }

    /// Cancels this promise when `signal` is requested. `relay` is this
    /// promise's own signal when `signal` is a different one.
    fn observe(&self, signal: &CancelSignal, relay: Option<CancelSignal>) -> Result<(), Failure> {
        let promise = self.promise.downgrade();
        let watched = self.promise.downgrade();
        signal.listen(
            Box::new(move || match promise.upgrade() {
                Some(promise) => Self::on_cancellation(&promise, relay.as_ref()),
                None => Ok(()),
            }),
            Some(Box::new(move || {
                watched.upgrade().is_some_and(|promise| promise.is_pending())
            })),
        )
    }

    fn on_cancellation(promise: &Promise<T>, relay: Option<&CancelSignal>) -> Result<(), Failure> {
        let Some(round) = promise.settle(Terminal::Canceled) else {
            return Ok(());
        };
        // Canceled through another signal: make our own observers see it too.
        let relayed = match relay {
            Some(own) if !own.is_requested() => own.fire(),
            _ => Ok(()),
        };
        relayed.and(round)
    }

    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    pub fn is_canceled(&self) -> bool {
        self.promise.is_canceled()
    }

    pub fn can_be_canceled(&self) -> bool {
        self.promise.is_pending()
    }

    /// Requests cancellation on this promise's signal, which cancels this
    /// promise and every promise sharing or linked to the signal.
    pub fn cancel(&self) -> Result<(), Error> {
        if !self.promise.is_pending() {
            return Err(Error::InvalidState { operation: "cancel" });
        }
        self.signal.request()
    }

    /// Like [`CancelablePromise::cancel`], but a settled promise is left as is.
    pub fn cancel_if_pending(&self) -> Result<(), Error> {
        if !self.promise.is_pending() {
            return Ok(());
        }
        self.signal.request()
    }

    pub fn then<F, R>(&self, on_success: F) -> Result<&Self, Error>
    where
        F: FnOnce(&T) -> R + 'static,
        R: CallbackOutput,
    {
        self.promise.then(on_success)?;
        Ok(self)
    }

    pub fn catch<F, R>(&self, on_failure: F) -> Result<&Self, Error>
    where
        F: FnOnce(&Failure) -> R + 'static,
        R: CallbackOutput,
    {
        self.promise.catch(on_failure)?;
        Ok(self)
    }

    pub fn finally<F, R>(&self, on_settle: F) -> Result<&Self, Error>
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutput,
    {
        self.promise.finally(on_settle)?;
        Ok(self)
    }

    /// Registers a callback that runs if the promise is canceled. It never
    /// runs if the promise succeeds or fails.
    pub fn canceled<F, R>(&self, on_cancel: F) -> Result<&Self, Error>
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutput,
    {
        self.promise
            .subscribe(Callback::Canceled(Box::new(move || on_cancel().into_result())))
            .map_err(Error::CallbackExecution)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::{Cell, RefCell},
        rc::Rc,
    };

    #[test]
    fn test_cancel_runs_canceled_then_finally() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let promise = CancelablePromise::<i32>::new();
        let (a, b, c) = (order.clone(), order.clone(), order.clone());
        promise
            .finally(move || a.borrow_mut().push("finally"))
            .unwrap()
            .canceled(move || b.borrow_mut().push("canceled"))
            .unwrap()
            .then(move |_| c.borrow_mut().push("then"))
            .unwrap();

        promise.cancel().unwrap();
        assert_eq!(*order.borrow(), ["canceled", "finally"]);
        assert!(promise.is_canceled());
        assert!(!promise.is_pending());
        assert!(!promise.has_succeeded());
        assert!(!promise.has_exception());
        assert!(promise.signal().is_requested());
    }

    #[test]
    fn test_canceled_after_cancel_runs_immediately() {
        let promise = CancelablePromise::<()>::new();
        promise.cancel().unwrap();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        promise.canceled(move || flag.set(true)).unwrap();
        assert!(ran.get());
    }

    #[test]
    fn test_canceled_never_runs_after_success() {
        let promise = CancelablePromise::<()>::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        promise.canceled(move || flag.set(true)).unwrap();
        promise.complete(()).unwrap();
        assert!(!ran.get());
        assert!(!promise.can_be_canceled());
    }

    #[test]
    fn test_cancel_after_settling_is_invalid() {
        let promise = CancelablePromise::<()>::new();
        promise.fail("broken").unwrap();
        assert!(matches!(
            promise.cancel(),
            Err(Error::InvalidState { operation: "cancel" })
        ));
        promise.cancel_if_pending().unwrap();

        let promise = CancelablePromise::<()>::new();
        promise.cancel().unwrap();
        assert!(matches!(promise.cancel(), Err(Error::InvalidState { .. })));
        assert!(matches!(promise.complete(()), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_requesting_signal_after_settle_is_noop() {
        let promise = CancelablePromise::<u8>::new();
        promise.complete(9).unwrap();
        promise.signal().request().unwrap();
        assert!(promise.has_succeeded());
        assert!(!promise.is_canceled());
    }

    #[test]
    fn test_shared_signal_cancels_externally() {
        let signal = CancelSignal::new();
        let promise = CancelablePromise::<()>::with_signal(signal.clone());
        assert!(promise.signal().ptr_eq(&signal));
        signal.request().unwrap();
        assert!(promise.is_canceled());
    }

    #[test]
    fn test_already_requested_signal_cancels_at_construction() {
        let signal = CancelSignal::new();
        signal.request().unwrap();
        let promise = CancelablePromise::<()>::with_signal(signal);
        assert!(promise.is_canceled());
    }

    #[test]
    fn test_linked_promise_relays_to_its_own_signal() {
        let parent = CancelSignal::new();
        let child = CancelablePromise::<()>::linked(&parent);
        assert!(!child.signal().ptr_eq(&parent));

        parent.request().unwrap();
        assert!(child.is_canceled());
        assert!(child.signal().is_requested());
    }

    #[test]
    fn test_settled_children_release_parent_listeners() {
        let parent = CancelSignal::new();
        let children: Vec<_> = (0..3)
            .map(|_| CancelablePromise::<()>::linked(&parent))
            .collect();
        let dropped = CancelablePromise::<()>::linked(&parent);
        assert_eq!(parent.listener_count(), 4);
        for child in &children {
            child.complete(()).unwrap();
        }
        drop(dropped);
        assert_eq!(parent.listener_count(), 4);

        let live = CancelablePromise::<()>::linked(&parent);
        assert_eq!(parent.listener_count(), 1);
        parent.request().unwrap();
        assert!(live.is_canceled());
    }

    #[test]
    fn test_canceling_linked_child_leaves_parent() {
        let parent = CancelSignal::new();
        let child = CancelablePromise::<()>::linked(&parent);
        child.cancel().unwrap();
        assert!(!parent.is_requested());
    }

    #[test]
    fn test_cancel_from_finally_during_completion_is_rejected() {
        let promise = CancelablePromise::<()>::new();
        let inner = promise.clone();
        promise
            .finally(move || inner.cancel().map_err(Failure::from))
            .unwrap();
        assert!(matches!(
            promise.complete(()),
            Err(Error::CallbackExecution(_))
        ));
        assert!(promise.has_succeeded());
    }

    #[test]
    fn test_cancel_reports_callback_failure() {
        let promise = CancelablePromise::<()>::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        promise
            .canceled(|| Err::<(), _>("listener broke"))
            .unwrap()
            .finally(move || flag.set(true))
            .unwrap();
        match promise.cancel() {
            Err(Error::CallbackExecution(failure)) => {
                assert_eq!(failure.to_string(), "listener broke")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ran.get());
        assert!(promise.is_canceled());
    }
}
