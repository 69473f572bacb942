//! Mapping the value completion of a sender.

use crate::{error::catch, Error, OperationState, Receiver, Result, Sender};

/// Returns a sender that passes the value of `source` through `func`.
///
/// `func` runs on whichever thread `source` completes on; `transform` itself never schedules.
/// Error and stopped completions of `source` are forwarded untouched, without calling `func`.
///
/// If `func` panics, the panic is caught and delivered as [`Error::Panicked`].
///
/// ```
/// use defewwed::{just, sync_wait, transform};
///
/// let doubled = transform(just(21), |x| x * 2);
/// assert_eq!(sync_wait(doubled).unwrap(), Some(42));
/// ```
pub fn transform<S, F, U>(source: S, func: F) -> Transform<S, F>
where
    S: Sender,
    F: FnOnce(S::Output) -> U + Send + 'static,
    U: Send + 'static,
{
    Transform { source, func }
}

/// Like [`transform`], but `func` may fail.
///
/// An [`Err`] returned by `func` becomes the error completion.
pub fn try_transform<S, F, U>(source: S, func: F) -> TryTransform<S, F>
where
    S: Sender,
    F: FnOnce(S::Output) -> Result<U> + Send + 'static,
    U: Send + 'static,
{
    TryTransform { source, func }
}

/// Sender returned by [`transform`].
#[derive(Debug, Clone)]
pub struct Transform<S, F> {
    source: S,
    func: F,
}

/// Sender returned by [`try_transform`].
#[derive(Debug, Clone)]
pub struct TryTransform<S, F> {
    source: S,
    func: F,
}

impl<S, F, U> Sender for Transform<S, F>
where
    S: Sender,
    F: FnOnce(S::Output) -> U + Send + 'static,
    U: Send + 'static,
{
    type Output = U;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<U>,
    {
        self.source.connect(TransformReceiver {
            receiver,
            func: self.func,
        })
    }
}

impl<S, F, U> Sender for TryTransform<S, F>
where
    S: Sender,
    F: FnOnce(S::Output) -> Result<U> + Send + 'static,
    U: Send + 'static,
{
    type Output = U;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<U>,
    {
        self.source.connect(TryTransformReceiver {
            receiver,
            func: self.func,
        })
    }
}

struct TransformReceiver<R, F> {
    receiver: R,
    func: F,
}

impl<T, U, R, F> Receiver<T> for TransformReceiver<R, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
    R: Receiver<U>,
{
    fn set_value(self, value: T) {
        match catch(move || (self.func)(value)) {
            Ok(value) => self.receiver.set_value(value),
            Err(error) => {
                log::debug!("transform callable panicked: {error}");
                self.receiver.set_error(error);
            }
        }
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }
}

struct TryTransformReceiver<R, F> {
    receiver: R,
    func: F,
}

impl<T, U, R, F> Receiver<T> for TryTransformReceiver<R, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> Result<U> + Send + 'static,
    R: Receiver<U>,
{
    fn set_value(self, value: T) {
        match catch(move || (self.func)(value)) {
            Ok(Ok(value)) => self.receiver.set_value(value),
            Ok(Err(error)) => self.receiver.set_error(error),
            Err(error) => {
                log::debug!("try_transform callable panicked: {error}");
                self.receiver.set_error(error);
            }
        }
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }
}
