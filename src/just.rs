//! Senders that complete immediately.

use std::marker::PhantomData;

use crate::{Error, OperationState, Receiver, Sender};

/// Returns a sender that completes inline with `value`.
///
/// ```
/// use defewwed::{just, sync_wait};
///
/// assert_eq!(sync_wait(just("hi")).unwrap(), Some("hi"));
/// ```
pub fn just<T: Send + 'static>(value: T) -> Just<T> {
    Just { value }
}

/// Returns a sender of `T` that completes inline with `error`.
pub fn just_error<T: Send + 'static>(error: Error) -> JustError<T> {
    JustError {
        error,
        _p: PhantomData,
    }
}

/// Returns a sender of `T` that completes inline with the stopped signal.
pub fn just_stopped<T: Send + 'static>() -> JustStopped<T> {
    JustStopped { _p: PhantomData }
}

/// Sender returned by [`just`].
#[derive(Debug, Clone)]
pub struct Just<T> {
    value: T,
}

/// Sender returned by [`just_error`].
#[derive(Debug)]
pub struct JustError<T> {
    error: Error,
    _p: PhantomData<fn() -> T>,
}

/// Sender returned by [`just_stopped`].
#[derive(Debug)]
pub struct JustStopped<T> {
    _p: PhantomData<fn() -> T>,
}

impl<T> Clone for JustStopped<T> {
    fn clone(&self) -> Self {
        Self { _p: PhantomData }
    }
}

/// Operation that completes its receiver as soon as it is started.
struct Immediate<F> {
    complete: F,
}

impl<F: FnOnce()> OperationState for Immediate<F> {
    fn start(self) {
        (self.complete)()
    }
}

impl<T: Send + 'static> Sender for Just<T> {
    type Output = T;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<T>,
    {
        Immediate {
            complete: move || receiver.set_value(self.value),
        }
    }
}

impl<T: Send + 'static> Sender for JustError<T> {
    type Output = T;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<T>,
    {
        Immediate {
            complete: move || receiver.set_error(self.error),
        }
    }
}

impl<T: Send + 'static> Sender for JustStopped<T> {
    type Output = T;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<T>,
    {
        Immediate {
            complete: move || receiver.set_stopped(),
        }
    }
}
