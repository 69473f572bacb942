//! The completion protocol connecting senders to receivers.
//!
//! A [`Sender`] describes work that has not started yet. Connecting it to a [`Receiver`] yields an
//! [`OperationState`], and starting that operation eventually invokes exactly one of the receiver's
//! three completion methods, exactly once.
//!
//! Both guarantees are enforced by ownership: [`Receiver`]'s methods and [`OperationState::start`]
//! take `self` by value, so a receiver cannot be completed twice and an operation cannot be
//! started twice.

use crate::Error;

/// The consumer of an asynchronous result.
///
/// Exactly one of the three methods is called on every receiver that is passed to
/// [`Sender::connect`], as long as the resulting operation is started. Completion may happen
/// inline, from within [`OperationState::start`], or later on some other thread.
pub trait Receiver<T>: Send + 'static {
    /// Completes the operation with a value.
    fn set_value(self, value: T);

    /// Completes the operation with an error.
    fn set_error(self, error: Error);

    /// Completes the operation without a value or an error.
    fn set_stopped(self);
}

/// A connected, not yet started operation.
pub trait OperationState {
    /// Starts the operation.
    ///
    /// The receiver the operation was connected to may be completed before this method returns.
    fn start(self);
}

/// A description of deferred work producing a [`Sender::Output`].
///
/// Senders are inert values: nothing happens until they are connected to a [`Receiver`] and the
/// resulting [`OperationState`] is started.
pub trait Sender: Send + 'static {
    /// The type of the value completion.
    type Output: Send + 'static;

    /// Connects this sender to `receiver`, producing an operation that can be started.
    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Self::Output>;
}

/// Connects `sender` to `receiver`.
pub fn connect<S, R>(sender: S, receiver: R) -> impl OperationState
where
    S: Sender,
    R: Receiver<S::Output>,
{
    sender.connect(receiver)
}

/// A stored completion.
///
/// Combinators that cannot notify their receiver right away (like
/// [`typed_via`][crate::typed_via()]) keep the outcome around as an [`Outcome`] and replay it later
/// with [`Outcome::deliver`].
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation completed with a value.
    Value(T),
    /// The operation completed with an error.
    Error(Error),
    /// The operation was stopped.
    Stopped,
}

impl<T> Outcome<T> {
    /// Completes `receiver` with this outcome.
    pub fn deliver<R: Receiver<T>>(self, receiver: R) {
        match self {
            Outcome::Value(value) => receiver.set_value(value),
            Outcome::Error(error) => receiver.set_error(error),
            Outcome::Stopped => receiver.set_stopped(),
        }
    }

    /// Converts the outcome into the shape returned by [`sync_wait`][crate::sync_wait()].
    pub fn into_result(self) -> Result<Option<T>, Error> {
        match self {
            Outcome::Value(value) => Ok(Some(value)),
            Outcome::Error(error) => Err(error),
            Outcome::Stopped => Ok(None),
        }
    }
}
