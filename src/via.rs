//! Moving completions onto a scheduler.

use crate::{transform, Error, OperationState, Outcome, Receiver, Scheduler, Sender, Transform};

/// Returns a sender that delivers the completion of `source` on `scheduler`'s context.
///
/// When `source` completes (with a value, an error, or the stopped signal), the outcome is stored
/// and a schedule operation from `scheduler` is started. Once that operation completes, the stored
/// outcome is replayed to the receiver, which therefore always runs on `scheduler`'s context,
/// regardless of where `source` completed.
///
/// If the schedule operation itself fails or stops, the stored outcome is dropped and that
/// failure is delivered instead.
pub fn typed_via<S, Sch>(source: S, scheduler: Sch) -> TypedVia<S, Sch>
where
    S: Sender,
    Sch: Scheduler,
{
    TypedVia { source, scheduler }
}

/// Returns a sender that moves the completion of `source` onto `scheduler`, then applies `func`
/// there.
///
/// This is `transform(typed_via(source, scheduler), func)`: `func` always observes `scheduler`'s
/// context, never the context `source` completed on.
///
/// ```
/// use defewwed::{just, sync_wait, then_execute, NewThreadContext};
///
/// let ctx = NewThreadContext::builder().name("compute").build();
/// let name = sync_wait(then_execute(ctx.scheduler(), just(()), |()| {
///     std::thread::current().name().map(String::from)
/// }))
/// .unwrap()
/// .flatten();
/// assert_eq!(name.as_deref(), Some("compute-0"));
/// ```
pub fn then_execute<Sch, S, F, U>(
    scheduler: Sch,
    source: S,
    func: F,
) -> Transform<TypedVia<S, Sch>, F>
where
    Sch: Scheduler,
    S: Sender,
    F: FnOnce(S::Output) -> U + Send + 'static,
    U: Send + 'static,
{
    transform(typed_via(source, scheduler), func)
}

/// Sender returned by [`typed_via`].
#[derive(Debug, Clone)]
pub struct TypedVia<S, Sch> {
    source: S,
    scheduler: Sch,
}

impl<S, Sch> Sender for TypedVia<S, Sch>
where
    S: Sender,
    Sch: Scheduler,
{
    type Output = S::Output;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<S::Output>,
    {
        self.source.connect(ViaReceiver {
            scheduler: self.scheduler,
            receiver,
        })
    }
}

/// Receives the source's completion and hops over to the scheduler.
struct ViaReceiver<Sch, R> {
    scheduler: Sch,
    receiver: R,
}

impl<Sch, R> ViaReceiver<Sch, R> {
    fn reschedule<T>(self, outcome: Outcome<T>)
    where
        Sch: Scheduler,
        R: Receiver<T>,
        T: Send + 'static,
    {
        self.scheduler
            .schedule()
            .connect(Replay {
                outcome,
                receiver: self.receiver,
            })
            .start();
    }
}

impl<T, Sch, R> Receiver<T> for ViaReceiver<Sch, R>
where
    T: Send + 'static,
    Sch: Scheduler,
    R: Receiver<T>,
{
    fn set_value(self, value: T) {
        self.reschedule(Outcome::Value(value));
    }

    fn set_error(self, error: Error) {
        self.reschedule(Outcome::Error(error));
    }

    fn set_stopped(self) {
        self.reschedule(Outcome::Stopped);
    }
}

/// Replays a stored outcome once the schedule operation has completed.
struct Replay<T, R> {
    outcome: Outcome<T>,
    receiver: R,
}

impl<T, R> Receiver<()> for Replay<T, R>
where
    T: Send + 'static,
    R: Receiver<T>,
{
    fn set_value(self, (): ()) {
        self.outcome.deliver(self.receiver);
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }
}
