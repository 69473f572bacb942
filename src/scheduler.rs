//! The scheduler abstraction.

use crate::{OperationState, Receiver, Sender};

/// A handle to some execution context.
///
/// The only thing a scheduler can do is produce schedule senders: senders that complete with `()`
/// once they are running on the scheduler's execution context. Every call to
/// [`Scheduler::schedule`] returns an independent sender, and several of them may run at once.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// The sender returned by [`Scheduler::schedule`].
    type Schedule: Sender<Output = ()>;

    /// Returns a sender that completes on this scheduler's execution context.
    fn schedule(&self) -> Self::Schedule;
}

/// Returns a sender that completes on `scheduler`'s execution context.
#[inline]
pub fn schedule<S: Scheduler>(scheduler: &S) -> S::Schedule {
    scheduler.schedule()
}

/// A scheduler whose execution context is "whichever thread starts the operation".
///
/// Schedule operations created by [`InlineScheduler`] complete from within
/// [`OperationState::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineScheduler;

/// Sender returned by [`InlineScheduler::schedule`].
#[derive(Debug, Clone, Copy)]
pub struct InlineSchedule {
    _priv: (),
}

struct InlineOperation<R> {
    receiver: R,
}

impl<R: Receiver<()>> OperationState for InlineOperation<R> {
    fn start(self) {
        self.receiver.set_value(());
    }
}

impl Sender for InlineSchedule {
    type Output = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<()>,
    {
        InlineOperation { receiver }
    }
}

impl Scheduler for InlineScheduler {
    type Schedule = InlineSchedule;

    fn schedule(&self) -> InlineSchedule {
        InlineSchedule { _priv: () }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{completion::tests::Recorder, transform, Outcome};

    #[test]
    fn inline_completes_within_start() {
        let (recorder, slot) = Recorder::new();
        let op = schedule(&InlineScheduler).connect(recorder);
        assert!(slot.lock().is_none());
        op.start();
        assert!(matches!(slot.lock().take(), Some(Outcome::Value(()))));
    }

    #[test]
    fn inline_runs_on_starting_thread() {
        let me = thread::current().id();
        let (recorder, slot) = Recorder::new();
        transform(InlineScheduler.schedule(), |()| thread::current().id())
            .connect(recorder)
            .start();
        let outcome = slot.lock().take();
        match outcome {
            Some(Outcome::Value(id)) => assert_eq!(id, me),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
