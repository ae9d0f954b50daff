//! The settlement core: a single-assignment result container that notifies
//! registered callbacks exactly once.
//!
//! A [`Promise`] is a handle. Clones share one state, and the state moves from
//! pending to exactly one terminal state. Callbacks registered while pending
//! run in registration order when the promise settles; callbacks registered
//! afterwards run immediately.
//!
//! ```
//! use promise_out::Promise;
//! use std::{cell::Cell, rc::Rc};
//!
//! let seen = Rc::new(Cell::new(0));
//! let promise = Promise::<i32>::new();
//! let observer = seen.clone();
//! promise.then(move |value| observer.set(*value)).unwrap();
//!
//! promise.complete(42).unwrap();
//! assert_eq!(seen.get(), 42);
//! assert!(promise.has_succeeded());
//! ```
use crate::{CallbackOutput, Error, Failure};
use std::{
    cell::RefCell,
    fmt, mem,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

pub(crate) type SuccessFn<T> = Box<dyn FnOnce(&T) -> Result<(), Failure>>;
pub(crate) type FailureFn = Box<dyn FnOnce(&Failure) -> Result<(), Failure>>;
pub(crate) type NotifyFn = Box<dyn FnOnce() -> Result<(), Failure>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a promise, used in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The terminal state of a promise, with the value or failure it settled with.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(Failure),
    Canceled,
}

impl<T> Outcome<T> {
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Failed(failure) => Err(Error::Failed(failure)),
            Outcome::Canceled => Err(Error::Canceled),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<Failure>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Succeeded(value),
            Err(error) => Outcome::Failed(error.into()),
        }
    }
}

pub(crate) enum Terminal<T> {
    Succeeded(Rc<T>),
    Failed(Failure),
    Canceled,
}

impl<T> Terminal<T> {
    fn name(&self) -> &'static str {
        match self {
            Terminal::Succeeded(_) => "succeeded",
            Terminal::Failed(_) => "failed",
            Terminal::Canceled => "canceled",
        }
    }
}

impl<T> Clone for Terminal<T> {
    fn clone(&self) -> Self {
        match self {
            Terminal::Succeeded(value) => Terminal::Succeeded(value.clone()),
            Terminal::Failed(failure) => Terminal::Failed(failure.clone()),
            Terminal::Canceled => Terminal::Canceled,
        }
    }
}

pub(crate) enum Callback<T> {
    Success(SuccessFn<T>),
    Failure(FailureFn),
    Canceled(NotifyFn),
    Settled(NotifyFn),
}

impl<T> Callback<T> {
    /// Runs the callback if it applies to `terminal`.
    fn invoke(self, terminal: &Terminal<T>) -> Result<(), Failure> {
        match (self, terminal) {
            (Callback::Success(f), Terminal::Succeeded(value)) => f(&**value),
            (Callback::Failure(f), Terminal::Failed(failure)) => f(failure),
            (Callback::Canceled(f), Terminal::Canceled) => f(),
            (Callback::Settled(f), _) => f(),
            _ => Ok(()),
        }
    }
}

struct Callbacks<T> {
    success: Vec<SuccessFn<T>>,
    failure: Vec<FailureFn>,
    canceled: Vec<NotifyFn>,
    settled: Vec<NotifyFn>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            success: Vec::with_capacity(1),
            failure: Vec::new(),
            canceled: Vec::new(),
            settled: Vec::new(),
        }
    }
}

impl<T> Callbacks<T> {
    fn push(&mut self, callback: Callback<T>) {
        match callback {
            Callback::Success(f) => self.success.push(f),
            Callback::Failure(f) => self.failure.push(f),
            Callback::Canceled(f) => self.canceled.push(f),
            Callback::Settled(f) => self.settled.push(f),
        }
    }
}

struct Inner<T> {
    id: PromiseId,
    terminal: Option<Terminal<T>>,
    callbacks: Callbacks<T>,
}

/// A single-assignment result container.
///
/// `Promise<()>` is the untyped form. All mutation is expected to happen on
/// one thread; see [`crate::remote`] for producers living elsewhere.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

pub(crate) struct WeakPromise<T> {
    inner: Weak<RefCell<Inner<T>>>,
}

impl<T> WeakPromise<T> {
    pub(crate) fn upgrade(&self) -> Option<Promise<T>> {
        self.inner.upgrade().map(|inner| Promise { inner })
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::with_terminal(None)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Promise")
            .field("id", &inner.id)
            .field(
                "state",
                &inner.terminal.as_ref().map_or("pending", Terminal::name),
            )
            .finish()
    }
}

impl<T> AsRef<Promise<T>> for Promise<T> {
    fn as_ref(&self) -> &Promise<T> {
        self
    }
}

thread_local! {
    static COMPLETED: Promise<()> = Promise::from_value(());
}

impl Promise<()> {
    /// An already completed promise, shared by every caller on this thread.
    pub fn completed() -> Self {
        COMPLETED.with(Promise::clone)
    }
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A promise that has already succeeded with `value`.
    pub fn from_value(value: T) -> Self {
        Self::with_terminal(Some(Terminal::Succeeded(Rc::new(value))))
    }

    /// A promise that has already failed with `failure`.
    pub fn from_failure(failure: impl Into<Failure>) -> Self {
        Self::with_terminal(Some(Terminal::Failed(failure.into())))
    }

    fn with_terminal(terminal: Option<Terminal<T>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id: PromiseId::next(),
                terminal,
                callbacks: Callbacks::default(),
            })),
        }
    }

    pub fn id(&self) -> PromiseId {
        self.inner.borrow().id
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().terminal.is_none()
    }

    pub fn has_succeeded(&self) -> bool {
        matches!(self.inner.borrow().terminal, Some(Terminal::Succeeded(_)))
    }

    pub fn has_exception(&self) -> bool {
        matches!(self.inner.borrow().terminal, Some(Terminal::Failed(_)))
    }

    pub(crate) fn is_canceled(&self) -> bool {
        matches!(self.inner.borrow().terminal, Some(Terminal::Canceled))
    }

    /// True when both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The failure this promise settled with, if it failed.
    pub fn failure(&self) -> Option<Failure> {
        match &self.inner.borrow().terminal {
            Some(Terminal::Failed(failure)) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Borrows the success value, if there is one.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = match &self.inner.borrow().terminal {
            Some(Terminal::Succeeded(value)) => value.clone(),
            _ => return None,
        };
        Some(f(&*value))
    }

    pub(crate) fn downgrade(&self) -> WeakPromise<T> {
        WeakPromise {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Registers `callback`, or runs it now if the promise has settled.
    pub(crate) fn subscribe(&self, callback: Callback<T>) -> Result<(), Failure> {
        let terminal = {
            let mut inner = self.inner.borrow_mut();
            match &inner.terminal {
                None => {
                    inner.callbacks.push(callback);
                    return Ok(());
                }
                Some(terminal) => terminal.clone(),
            }
        };
        callback.invoke(&terminal)
    }

    /// Registers a callback that runs when the promise succeeds.
    ///
    /// If the promise has already succeeded the callback runs before this
    /// returns, and a failure it returns comes back as
    /// [`Error::CallbackExecution`].
    pub fn then<F, R>(&self, on_success: F) -> Result<&Self, Error>
    where
        F: FnOnce(&T) -> R + 'static,
        R: CallbackOutput,
    {
        self.subscribe(Callback::Success(Box::new(move |value| {
            on_success(value).into_result()
        })))
        .map_err(Error::CallbackExecution)?;
        Ok(self)
    }

    /// Registers a callback that runs when the promise fails.
    pub fn catch<F, R>(&self, on_failure: F) -> Result<&Self, Error>
    where
        F: FnOnce(&Failure) -> R + 'static,
        R: CallbackOutput,
    {
        self.subscribe(Callback::Failure(Box::new(move |failure| {
            on_failure(failure).into_result()
        })))
        .map_err(Error::CallbackExecution)?;
        Ok(self)
    }

    /// Registers a callback that runs however the promise settles, after the
    /// success, failure or cancellation callbacks.
    pub fn finally<F, R>(&self, on_settle: F) -> Result<&Self, Error>
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutput,
    {
        self.subscribe(Callback::Settled(Box::new(move || {
            on_settle().into_result()
        })))
        .map_err(Error::CallbackExecution)?;
        Ok(self)
    }

    /// Settles the promise with `value` and runs the success callbacks, then
    /// the finally callbacks.
    ///
    /// Every callback runs even if an earlier one fails. The last failure of
    /// the round is returned as [`Error::CallbackExecution`].
    pub fn complete(&self, value: T) -> Result<(), Error> {
        self.settle(Terminal::Succeeded(Rc::new(value)))
            .ok_or(Error::InvalidState {
                operation: "complete",
            })?
            .map_err(Error::CallbackExecution)
    }

    /// Settles the promise with `failure`; symmetric to [`Promise::complete`].
    pub fn fail(&self, failure: impl Into<Failure>) -> Result<(), Error> {
        self.settle(Terminal::Failed(failure.into()))
            .ok_or(Error::InvalidState { operation: "fail" })?
            .map_err(Error::CallbackExecution)
    }

    /// Runs one settlement round.
    ///
    /// Returns `None` without touching anything if the promise already left
    /// pending, otherwise the last failure returned by a callback.
    pub(crate) fn settle(&self, terminal: Terminal<T>) -> Option<Result<(), Failure>> {
        let (id, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.terminal.is_some() {
                return None;
            }
            inner.terminal = Some(terminal.clone());
            (inner.id, mem::take(&mut inner.callbacks))
        };

        let Callbacks {
            success,
            failure,
            canceled,
            settled,
        } = callbacks;
        let mut captured = None;
        let mut dispatched = settled.len();
        match &terminal {
            Terminal::Succeeded(value) => {
                dispatched += success.len();
                for callback in success {
                    capture(id, &mut captured, callback(&**value));
                }
            }
            Terminal::Failed(error) => {
                dispatched += failure.len();
                for callback in failure {
                    capture(id, &mut captured, callback(error));
                }
            }
            Terminal::Canceled => {
                dispatched += canceled.len();
                for callback in canceled {
                    capture(id, &mut captured, callback());
                }
            }
        }
        for callback in settled {
            capture(id, &mut captured, callback());
        }
        tracing::trace!(promise = %id, state = terminal.name(), callbacks = dispatched, "promise settled");

        Some(captured.map_or(Ok(()), Err))
    }
}

impl<T: Clone> Promise<T> {
    /// A copy of the success value, if there is one.
    pub fn value(&self) -> Option<T> {
        self.with_value(T::clone)
    }

    /// The terminal state, or `None` while pending.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.inner
            .borrow()
            .terminal
            .as_ref()
            .map(|terminal| match terminal {
                Terminal::Succeeded(value) => Outcome::Succeeded(T::clone(&**value)),
                Terminal::Failed(failure) => Outcome::Failed(failure.clone()),
                Terminal::Canceled => Outcome::Canceled,
            })
    }
}

/// Keeps the last failure of a round.
pub(crate) fn capture(id: PromiseId, captured: &mut Option<Failure>, result: Result<(), Failure>) {
    if let Err(failure) = result {
        tracing::debug!(promise = %id, %failure, "callback failed during settlement");
        *captured = Some(failure);
    }
}

/// For registrations whose callbacks only complete or fail a promise the
/// caller has not seen yet. Such a promise has no subscribers and settling it
/// requests no signal, so the registration cannot fault. Anything that may
/// cancel propagates its result instead.
pub(crate) fn wire<R, E>(result: Result<R, E>) {
    debug_assert!(result.is_ok(), "fault while wiring a fresh promise");
}
