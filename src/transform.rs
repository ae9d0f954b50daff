//! Operators that derive a new promise from an existing one.
//!
//! Every operator returns a fresh downstream promise and subscribes to the
//! source; the source's settlement is forwarded, possibly transformed. On a
//! [`CancelablePromise`] the downstream is cancelable too and relates to the
//! source's signal as described on each operator.
use crate::{promise::wire, CancelablePromise, Chaining, Error, Failure, Promise};

/// A promise returned by a continuation handler, whose settlement is
/// forwarded into the continuation's downstream promise.
pub trait Chain: 'static {
    type Output: Clone + 'static;

    /// Forwards success and failure into `downstream`.
    fn forward_to(&self, downstream: &Promise<Self::Output>) -> Result<(), Error>;

    /// Forwards into a cancelable downstream. A cancelable handler result is
    /// linked both ways: canceling either cancels the other.
    fn forward_into(&self, downstream: &CancelablePromise<Self::Output>) -> Result<(), Error>;
}

impl<U: Clone + 'static> Chain for Promise<U> {
    type Output = U;

    fn forward_to(&self, downstream: &Promise<U>) -> Result<(), Error> {
        let on_failure = downstream.clone();
        self.catch(move |failure| {
            if on_failure.is_pending() {
                on_failure.fail(failure.clone())
            } else {
                Ok(())
            }
        })?;
        let on_success = downstream.clone();
        self.then(move |value| {
            if on_success.is_pending() {
                on_success.complete(value.clone())
            } else {
                Ok(())
            }
        })?;
        Ok(())
    }

    fn forward_into(&self, downstream: &CancelablePromise<U>) -> Result<(), Error> {
        self.forward_to(downstream.promise())
    }
}

impl<U: Clone + 'static> Chain for CancelablePromise<U> {
    type Output = U;

    fn forward_to(&self, downstream: &Promise<U>) -> Result<(), Error> {
        self.promise().forward_to(downstream)
    }

    fn forward_into(&self, downstream: &CancelablePromise<U>) -> Result<(), Error> {
        self.promise().forward_to(downstream.promise())?;
        let outer = downstream.clone();
        self.canceled(move || outer.cancel_if_pending())?;
        let inner = self.clone();
        downstream.canceled(move || inner.cancel_if_pending())?;
        Ok(())
    }
}

/// Optional handlers and the chaining policy for
/// [`CancelablePromise::continue_with_options`].
pub struct ContinueOptions<P> {
    on_cancel: Option<Box<dyn FnOnce() -> P>>,
    on_failure: Option<Box<dyn FnOnce(&Failure) -> P>>,
    chaining: Chaining,
}

impl<P> Default for ContinueOptions<P> {
    fn default() -> Self {
        Self {
            on_cancel: None,
            on_failure: None,
            chaining: Chaining::default(),
        }
    }
}

impl<P> ContinueOptions<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues with the promise `on_cancel` returns when the source is
    /// canceled. Without it a canceled source leaves the downstream to its
    /// chaining policy.
    pub fn on_cancel(mut self, on_cancel: impl FnOnce() -> P + 'static) -> Self {
        self.on_cancel = Some(Box::new(on_cancel));
        self
    }

    /// Continues with the promise `on_failure` returns when the source fails.
    /// Without it the failure is forwarded as is.
    pub fn on_failure(mut self, on_failure: impl FnOnce(&Failure) -> P + 'static) -> Self {
        self.on_failure = Some(Box::new(on_failure));
        self
    }

    pub fn chaining(mut self, chaining: Chaining) -> Self {
        self.chaining = chaining;
        self
    }
}

fn wire_transform<T, U>(
    source: &Promise<T>,
    downstream: &Promise<U>,
    transform: impl FnOnce(&T) -> Result<U, Failure> + 'static,
) where
    T: 'static,
    U: 'static,
{
    let on_failure = downstream.clone();
    wire(source.catch(move |failure| on_failure.fail(failure.clone())));
    let on_success = downstream.clone();
    wire(source.then(move |value| match transform(value) {
        Ok(value) => on_success.complete(value),
        Err(failure) => on_success.fail(failure),
    }));
}

fn wire_transform_exception<T, E>(
    source: &Promise<T>,
    downstream: &Promise<T>,
    transform: impl FnOnce(&Failure) -> E + 'static,
) where
    T: Clone + 'static,
    E: Into<Failure>,
{
    let on_failure = downstream.clone();
    wire(source.catch(move |failure| on_failure.fail(transform(failure))));
    let on_success = downstream.clone();
    wire(source.then(move |value| on_success.complete(value.clone())));
}

impl<T: 'static> Promise<T> {
    /// A promise that succeeds with `transform(value)` once this one succeeds
    /// and fails with the same failure otherwise.
    pub fn transform<U, F>(&self, transform: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(&T) -> U + 'static,
    {
        let downstream = Promise::new();
        wire_transform(self, &downstream, move |value| Ok(transform(value)));
        downstream
    }

    /// Like [`Promise::transform`], but an `Err` from `transform` fails the
    /// downstream promise.
    pub fn try_transform<U, E, F>(&self, transform: F) -> Promise<U>
    where
        U: 'static,
        E: Into<Failure>,
        F: FnOnce(&T) -> Result<U, E> + 'static,
    {
        let downstream = Promise::new();
        wire_transform(self, &downstream, move |value| {
            transform(value).map_err(Into::into)
        });
        downstream
    }

    /// Continues with the promise `on_success` returns once this one
    /// succeeds. A failure is forwarded to the downstream promise.
    ///
    /// If this promise has already settled the handler runs before this
    /// returns, and a fault raised while forwarding its promise comes back as
    /// the error.
    pub fn continue_with<P, F>(&self, on_success: F) -> Result<Promise<P::Output>, Error>
    where
        P: Chain,
        F: FnOnce(&T) -> P + 'static,
    {
        self.continue_with_handlers(on_success, None)
    }

    /// Like [`Promise::continue_with`], but a failure continues with the
    /// promise `on_failure` returns.
    pub fn continue_with_fallback<P, F, G>(
        &self,
        on_success: F,
        on_failure: G,
    ) -> Result<Promise<P::Output>, Error>
    where
        P: Chain,
        F: FnOnce(&T) -> P + 'static,
        G: FnOnce(&Failure) -> P + 'static,
    {
        self.continue_with_handlers(on_success, Some(Box::new(on_failure)))
    }

    fn continue_with_handlers<P, F>(
        &self,
        on_success: F,
        on_failure: Option<Box<dyn FnOnce(&Failure) -> P>>,
    ) -> Result<Promise<P::Output>, Error>
    where
        P: Chain,
        F: FnOnce(&T) -> P + 'static,
    {
        let downstream = Promise::new();

        let failed = downstream.clone();
        self.catch(move |failure| {
            if !failed.is_pending() {
                return Ok(());
            }
            match on_failure {
                Some(on_failure) => on_failure(failure).forward_to(&failed),
                None => failed.fail(failure.clone()),
            }
        })?;

        let succeeded = downstream.clone();
        self.then(move |value| {
            if !succeeded.is_pending() {
                return Ok(());
            }
            on_success(value).forward_to(&succeeded)
        })?;

        Ok(downstream)
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// A promise that fails with `transform(failure)` once this one fails and
    /// succeeds with the same value otherwise.
    pub fn transform_exception<E, F>(&self, transform: F) -> Promise<T>
    where
        E: Into<Failure>,
        F: FnOnce(&Failure) -> E + 'static,
    {
        let downstream = Promise::new();
        wire_transform_exception(self, &downstream, transform);
        downstream
    }
}

impl<T: 'static> CancelablePromise<T> {
    /// Like [`Promise::transform`]. The downstream promise shares this
    /// promise's signal, so canceling either cancels both.
    pub fn transform<U, F>(&self, transform: F) -> CancelablePromise<U>
    where
        U: 'static,
        F: FnOnce(&T) -> U + 'static,
    {
        let downstream = CancelablePromise::with_signal(self.signal().clone());
        wire_transform(self.promise(), downstream.promise(), move |value| {
            Ok(transform(value))
        });
        downstream
    }

    pub fn try_transform<U, E, F>(&self, transform: F) -> CancelablePromise<U>
    where
        U: 'static,
        E: Into<Failure>,
        F: FnOnce(&T) -> Result<U, E> + 'static,
    {
        let downstream = CancelablePromise::with_signal(self.signal().clone());
        wire_transform(self.promise(), downstream.promise(), move |value| {
            transform(value).map_err(Into::into)
        });
        downstream
    }

    /// Continues with the promise `on_success` returns, sharing this
    /// promise's signal with the downstream promise.
    pub fn continue_with<P, F>(&self, on_success: F) -> Result<CancelablePromise<P::Output>, Error>
    where
        P: Chain,
        F: FnOnce(&T) -> P + 'static,
    {
        self.continue_with_options(on_success, ContinueOptions::new())
    }

    /// Continues with the promise the matching handler returns.
    ///
    /// The downstream promise relates to this promise's signal as
    /// `options.chaining` says. While a handler's promise is in flight it is
    /// linked both ways with the downstream promise, whatever the chaining.
    /// A handler is not invoked if the downstream promise has already
    /// settled.
    ///
    /// With an `on_cancel` handler the downstream promise continues with the
    /// handler's promise instead of being canceled along with this one. Under
    /// [`Chaining::CancelAll`] canceling the downstream still cancels this
    /// promise.
    ///
    /// Handlers run before this returns if this promise has already settled;
    /// a fault raised while forwarding their promises comes back as the
    /// error.
    pub fn continue_with_options<P, F>(
        &self,
        on_success: F,
        options: ContinueOptions<P>,
    ) -> Result<CancelablePromise<P::Output>, Error>
    where
        P: Chain,
        F: FnOnce(&T) -> P + 'static,
    {
        let ContinueOptions {
            on_cancel,
            on_failure,
            chaining,
        } = options;
        let downstream = match (&on_cancel, chaining) {
            (None, _) => CancelablePromise::chained(self.signal(), chaining),
            (Some(_), Chaining::CancelAll) => {
                let downstream = CancelablePromise::new();
                let source = self.clone();
                wire(downstream.canceled(move || source.cancel_if_pending()));
                downstream
            }
            (Some(_), _) => CancelablePromise::new(),
        };

        let failed = downstream.clone();
        self.catch(move |failure| {
            if !failed.is_pending() {
                return Ok(());
            }
            match on_failure {
                Some(on_failure) => on_failure(failure).forward_into(&failed),
                None => failed.fail(failure.clone()),
            }
        })?;

        let canceled = downstream.clone();
        self.canceled(move || match on_cancel {
            Some(on_cancel) if canceled.is_pending() => on_cancel().forward_into(&canceled),
            _ => Ok(()),
        })?;

        let succeeded = downstream.clone();
        self.then(move |value| {
            if !succeeded.is_pending() {
                return Ok(());
            }
            on_success(value).forward_into(&succeeded)
        })?;

        Ok(downstream)
    }
}

impl<T: Clone + 'static> CancelablePromise<T> {
    /// Like [`Promise::transform_exception`], sharing this promise's signal.
    pub fn transform_exception<E, F>(&self, transform: F) -> CancelablePromise<T>
    where
        E: Into<Failure>,
        F: FnOnce(&Failure) -> E + 'static,
    {
        let downstream = CancelablePromise::with_signal(self.signal().clone());
        wire_transform_exception(self.promise(), downstream.promise(), transform);
        downstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_maps_value() {
        let source = Promise::<i32>::new();
        let doubled = source.transform(|v| v * 2);
        source.complete(21).unwrap();
        assert_eq!(doubled.value(), Some(42));
    }

    #[test]
    fn test_transform_forwards_failure() {
        let source = Promise::<i32>::new();
        let doubled = source.transform(|v| v * 2);
        source.fail("bad input").unwrap();
        assert_eq!(doubled.failure().unwrap().to_string(), "bad input");
    }

    #[test]
    fn test_try_transform_fails_downstream() {
        let source = Promise::<&str>::new();
        let parsed = source.try_transform(|s| s.parse::<i32>().map_err(|e| e.to_string()));
        source.complete("x").unwrap();
        assert!(parsed.has_exception());
        assert!(source.has_succeeded());
    }

    #[test]
    fn test_transform_exception_only_touches_failures() {
        let source = Promise::<u8>::new();
        let renamed = source.transform_exception(|f| format!("wrapped: {f}"));
        source.fail("inner").unwrap();
        assert_eq!(renamed.failure().unwrap().to_string(), "wrapped: inner");

        let source = Promise::<u8>::new();
        let renamed = source.transform_exception(|f| format!("wrapped: {f}"));
        source.complete(3).unwrap();
        assert_eq!(renamed.value(), Some(3));
    }

    #[test]
    fn test_continue_with_follows_inner_promise() {
        let source = Promise::<i32>::new();
        let inner = Promise::<String>::new();
        let handed = inner.clone();
        let downstream = source.continue_with(move |_| handed).unwrap();

        source.complete(1).unwrap();
        assert!(downstream.is_pending());
        inner.complete("done".to_string()).unwrap();
        assert_eq!(downstream.value().as_deref(), Some("done"));
    }

    #[test]
    fn test_continue_with_fallback_recovers() {
        let source = Promise::<i32>::new();
        let downstream = source.continue_with_fallback(
            |v| Promise::from_value(*v),
            |_| Promise::from_value(-1),
        )
        .unwrap();
        source.fail("lost").unwrap();
        assert_eq!(downstream.value(), Some(-1));
    }

    #[test]
    fn test_continue_with_forwards_inner_failure() {
        let source = Promise::<()>::new();
        let downstream = source
            .continue_with(|_| Promise::<u8>::from_failure("inner broke"))
            .unwrap();
        source.complete(()).unwrap();
        assert_eq!(downstream.failure().unwrap().to_string(), "inner broke");
    }

    #[test]
    fn test_cancelable_transform_shares_signal() {
        let source = CancelablePromise::<i32>::new();
        let mapped = source.transform(|v| v + 1);
        assert!(mapped.signal().ptr_eq(source.signal()));
        mapped.cancel().unwrap();
        assert!(source.is_canceled());
    }

    #[test]
    fn test_cancelable_transform_exception_shares_signal() {
        let source = CancelablePromise::<i32>::new();
        let mapped = source.transform_exception(|f| f.clone());
        source.cancel().unwrap();
        assert!(mapped.is_canceled());
    }
}
