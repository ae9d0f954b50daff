//! The failure payload carried by a failed promise and returned by callbacks.
use std::{error::Error as StdError, fmt, sync::Arc};

/// A shared, cheaply clonable error.
///
/// A failed promise hands the same `Failure` to every `catch` callback and to
/// every derived promise, so the payload is reference counted rather than
/// owned.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// A failure carrying only a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// True when both handles point at the same underlying error.
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<crate::Error> for Failure {
    fn from(error: crate::Error) -> Self {
        Self::new(error)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(Message(message))
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// What a callback may return.
///
/// `()` never fails. `Result<(), E>` fails with `E`, which is captured by the
/// settlement round that ran the callback.
pub trait CallbackOutput {
    fn into_result(self) -> Result<(), Failure>;
}

impl CallbackOutput for () {
    fn into_result(self) -> Result<(), Failure> {
        Ok(())
    }
}

impl<E> CallbackOutput for Result<(), E>
where
    E: Into<Failure>,
{
    fn into_result(self) -> Result<(), Failure> {
        self.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_clones_share_the_error() {
        let failure = Failure::msg("boom");
        let clone = failure.clone();
        assert!(failure.ptr_eq(&clone));
        assert_eq!(clone.to_string(), "boom");
    }

    #[test]
    fn test_failure_downcasts_to_crate_error() {
        let failure = Failure::from(crate::Error::Canceled);
        assert!(failure.is::<crate::Error>());
        assert!(matches!(
            failure.downcast_ref::<crate::Error>(),
            Some(crate::Error::Canceled)
        ));
    }

    #[test]
    fn test_callback_output_maps_errors() {
        assert!(().into_result().is_ok());
        let result: Result<(), &str> = Err("bad");
        assert_eq!(result.into_result().unwrap_err().to_string(), "bad");
    }
}
