//! Blocking on the completion of a sender.

use crossbeam_channel::Sender as Channel;

use crate::{Error, OperationState, Outcome, Receiver, Sender};

/// Starts `sender` and blocks the calling thread until it completes.
///
/// Returns:
///
/// - `Ok(Some(value))` if `sender` completed with a value,
/// - `Err(error)` if it completed with an error,
/// - `Ok(None)` if it was stopped.
///
/// If the receiver is dropped without ever being completed, [`Error::Abandoned`] is returned
/// instead of blocking forever.
///
/// This is the only blocking operation in this crate. Calling it from a thread that some operation
/// in `sender` needs to make progress will deadlock.
///
/// # Examples
///
/// ```
/// use defewwed::{just, just_error, just_stopped, sync_wait, Error};
///
/// assert_eq!(sync_wait(just(1)).unwrap(), Some(1));
/// assert_eq!(sync_wait(just_stopped::<i32>()).unwrap(), None);
/// assert!(matches!(
///     sync_wait(just_error::<i32>(Error::ShutDown)),
///     Err(Error::ShutDown)
/// ));
/// ```
pub fn sync_wait<S: Sender>(sender: S) -> Result<Option<S::Output>, Error> {
    let (channel, outcome) = crossbeam_channel::bounded::<Outcome<S::Output>>(1);
    sender.connect(SyncWaitReceiver { channel }).start();

    log::trace!("sync_wait: blocking until the operation completes");
    match outcome.recv() {
        Ok(outcome) => outcome.into_result(),
        Err(_) => Err(Error::Abandoned),
    }
}

struct SyncWaitReceiver<T> {
    channel: Channel<Outcome<T>>,
}

impl<T> SyncWaitReceiver<T> {
    fn complete(self, outcome: Outcome<T>) {
        // The waiting thread only goes away after receiving, so this cannot fail.
        let _ = self.channel.send(outcome);
    }
}

impl<T: Send + 'static> Receiver<T> for SyncWaitReceiver<T> {
    fn set_value(self, value: T) {
        self.complete(Outcome::Value(value));
    }

    fn set_error(self, error: Error) {
        self.complete(Outcome::Error(error));
    }

    fn set_stopped(self) {
        self.complete(Outcome::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{then_execute, transform, NewThreadContext, Scheduler};

    /// A sender that drops its receiver instead of completing it.
    struct Forgetful;

    struct Dropping<R>(R);

    impl<R> OperationState for Dropping<R> {
        fn start(self) {
            drop(self.0);
        }
    }

    impl Sender for Forgetful {
        type Output = ();

        fn connect<R>(self, receiver: R) -> impl OperationState
        where
            R: Receiver<()>,
        {
            Dropping(receiver)
        }
    }

    #[test]
    fn blocks_until_worker_completes() {
        let ctx = NewThreadContext::builder().name("sync-wait").build();
        let name = sync_wait(then_execute(ctx.scheduler(), ctx.scheduler().schedule(), |()| {
            thread::current().name().map(String::from)
        }))
        .unwrap()
        .flatten();
        assert!(name.unwrap().starts_with("sync-wait-"));
    }

    #[test]
    fn error_is_returned() {
        let ctx = NewThreadContext::new();
        let err = sync_wait(crate::try_transform(ctx.scheduler().schedule(), |()| {
            Err::<(), _>(Error::other("worker failed"))
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "worker failed");
    }

    #[test]
    fn panic_is_returned_as_error() {
        let ctx = NewThreadContext::new();
        let err = sync_wait(transform(ctx.scheduler().schedule(), |()| {
            std::panic::resume_unwind(Box::new("worker panic"));
        }))
        .unwrap_err();
        match err {
            Error::Panicked(panic) => assert_eq!(panic.message(), Some("worker panic")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn abandoned_receiver_does_not_hang() {
        assert!(matches!(sync_wait(Forgetful), Err(Error::Abandoned)));
    }
}
