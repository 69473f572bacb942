//! The error payload carried by error completions.

use std::{
    any::Any,
    fmt, io,
    panic::{self, resume_unwind, AssertUnwindSafe},
};

/// Convenience alias for results whose error is [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The payload of an error completion.
///
/// Combinators never interpret this value: it is routed unchanged from the sender that produced it
/// to whatever consumes the outcome (usually [`sync_wait`][crate::sync_wait()]).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A [`NewThreadContext`][crate::NewThreadContext] failed to create a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),

    /// A schedule operation was started after its context had finished shutting down.
    #[error("scheduler context has shut down")]
    ShutDown,

    /// A user-supplied callable panicked.
    #[error("callable panicked: {0}")]
    Panicked(Panic),

    /// A receiver was dropped without being completed.
    #[error("operation was dropped without completing its receiver")]
    Abandoned,

    /// An error produced by user code.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wraps an arbitrary error so that it can travel through an error completion.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::Other(error.into())
    }
}

/// The payload of a caught panic.
pub struct Panic {
    payload: Box<dyn Any + Send + 'static>,
}

impl Panic {
    pub(crate) fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// Returns the panic message, if the payload is a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref::<&'static str>() {
            Some(s)
        } else if let Some(s) = self.payload.downcast_ref::<String>() {
            Some(s)
        } else {
            None
        }
    }

    /// Resumes unwinding with the original payload on the calling thread.
    pub fn resume(self) -> ! {
        resume_unwind(self.payload)
    }
}

/// Runs `f`, converting a panic into [`Error::Panicked`].
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| Error::Panicked(Panic::new(payload)))
}

impl fmt::Debug for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panic")
            .field("message", &self.message())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or("Box<dyn Any>"))
    }
}

#[cfg(test)]
mod tests {
    use std::panic::catch_unwind;

    use super::*;

    fn assert_send<T: Send>() {}

    fn silent_panic(payload: String) {
        resume_unwind(Box::new(payload));
    }

    #[test]
    fn error_is_send() {
        assert_send::<Error>();
    }

    #[test]
    fn catch_converts_panic() {
        let err = catch(|| silent_panic("boom".into())).unwrap_err();
        match err {
            Error::Panicked(panic) => {
                assert_eq!(panic.message(), Some("boom"));
                assert_eq!(panic.to_string(), "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn catch_passes_value_through() {
        assert_eq!(catch(|| 7).unwrap(), 7);
    }

    #[test]
    fn panic_resumes_original_payload() {
        let Error::Panicked(panic) = catch(|| silent_panic("again".into())).unwrap_err() else {
            unreachable!()
        };
        let payload = catch_unwind(AssertUnwindSafe(move || {
            panic.resume();
        }))
        .unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "again");
    }

    #[test]
    fn other_wraps_user_errors() {
        let err = Error::other("bad input");
        assert_eq!(err.to_string(), "bad input");
        let err = Error::other(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(matches!(err, Error::Other(_)));
    }
}
