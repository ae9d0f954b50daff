use crate::{promise::NotifyFn, CallbackOutput, Error, Failure};
use std::{
    cell::{Cell, RefCell},
    fmt, mem,
    rc::Rc,
};

/// A shared cancellation flag.
///
/// Once requested the flag stays set. Listeners run once, in registration
/// order, when it is first requested; a listener added afterwards runs
/// immediately. Clones observe and trigger the same flag.
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Rc<Inner>,
}

#[derive(Default)]
struct Inner {
    requested: Cell<bool>,
    listeners: RefCell<Vec<Listener>>,
}

struct Listener {
    notify: NotifyFn,
    /// False once the listener can no longer have an effect.
    live: Option<Box<dyn Fn() -> bool>>,
}

impl Listener {
    fn is_live(&self) -> bool {
        self.live.as_ref().map_or(true, |live| live())
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("requested", &self.is_requested())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.get()
    }

    /// True when both handles share one flag.
    pub fn ptr_eq(&self, other: &CancelSignal) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sets the flag and runs the listeners. A second request is a no-op.
    pub fn request(&self) -> Result<(), Error> {
        self.fire().map_err(Error::CallbackExecution)
    }

    /// Registers a listener for the request, running it now if the flag is
    /// already set.
    pub fn on_request<F, R>(&self, listener: F) -> Result<(), Error>
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutput,
    {
        self.listen(Box::new(move || listener().into_result()), None)
            .map_err(Error::CallbackExecution)
    }

    /// Registers `notify`. When `live` is given, listeners it reports dead
    /// are dropped the next time a listener is registered.
    pub(crate) fn listen(
        &self,
        notify: NotifyFn,
        live: Option<Box<dyn Fn() -> bool>>,
    ) -> Result<(), Failure> {
        if self.is_requested() {
            return notify();
        }
        let mut listeners = self.inner.listeners.borrow_mut();
        listeners.retain(Listener::is_live);
        listeners.push(Listener { notify, live });
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Returns the last failure among the listeners.
    pub(crate) fn fire(&self) -> Result<(), Failure> {
        if self.inner.requested.replace(true) {
            return Ok(());
        }
        let listeners = mem::take(&mut *self.inner.listeners.borrow_mut());
        tracing::trace!(listeners = listeners.len(), "cancellation requested");

        let mut captured = None;
        for listener in listeners {
            if let Err(failure) = (listener.notify)() {
                tracing::debug!(%failure, "cancellation listener failed");
                captured = Some(failure);
            }
        }
        captured.map_or(Ok(()), Err)
    }
}
