//! Joining independent senders.
//!
//! [`when_all`] and [`zip`] start every child operation, wait for *all* of them to complete, and
//! then complete exactly once:
//!
//! - with the children's values in positional order, if every child produced a value;
//! - otherwise with the first error or stopped signal that arrived.
//!
//! Failures arriving after the first one are dropped. When several children fail concurrently, the
//! one that takes the aggregate's lock first wins.

use std::{
    mem,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{Error, OperationState, Receiver, Sender};

/// Returns a sender that completes once every sender in `senders` has completed.
///
/// The value is a [`Vec`] holding each sender's value at that sender's position, regardless of the
/// order in which they completed. An empty `senders` completes immediately with an empty [`Vec`].
///
/// A child that never completes keeps the aggregate from ever completing.
///
/// ```
/// use defewwed::{sync_wait, transform, when_all, NewThreadContext, Scheduler};
///
/// let ctx = NewThreadContext::new();
/// let tasks = (0..4).map(|i| transform(ctx.scheduler().schedule(), move |()| i * 10));
/// assert_eq!(sync_wait(when_all(tasks)).unwrap(), Some(vec![0, 10, 20, 30]));
/// ```
pub fn when_all<I>(senders: I) -> WhenAll<I::Item>
where
    I: IntoIterator,
    I::Item: Sender,
{
    WhenAll {
        senders: senders.into_iter().collect(),
    }
}

/// Returns a sender that completes with the values of `a` and `b` once both have completed.
///
/// Errors and stopped signals are handled exactly like in [`when_all`].
pub fn zip<A: Sender, B: Sender>(a: A, b: B) -> Zip<A, B> {
    Zip { a, b }
}

/// Sender returned by [`when_all`].
#[derive(Debug, Clone)]
pub struct WhenAll<S> {
    senders: Vec<S>,
}

/// Sender returned by [`zip`].
#[derive(Debug, Clone)]
pub struct Zip<A, B> {
    a: A,
    b: B,
}

/// Storage for the children's values.
trait Slots: Send + 'static {
    type Output: Send + 'static;

    /// Takes the values out. Only called once every child has produced a value.
    fn collect(&mut self) -> Self::Output;
}

impl<T: Send + 'static> Slots for Vec<Option<T>> {
    type Output = Vec<T>;

    fn collect(&mut self) -> Vec<T> {
        mem::take(self)
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| unreachable!("child completed without a value")))
            .collect()
    }
}

impl<A: Send + 'static, B: Send + 'static> Slots for (Option<A>, Option<B>) {
    type Output = (A, B);

    fn collect(&mut self) -> (A, B) {
        match (self.0.take(), self.1.take()) {
            (Some(a), Some(b)) => (a, b),
            _ => unreachable!("child completed without a value"),
        }
    }
}

enum Failure {
    Error(Error),
    Stopped,
}

/// State shared by all children of one aggregate.
struct Aggregate<V, R> {
    /// Number of children that have not completed yet.
    remaining: AtomicUsize,
    /// The first error or stopped signal observed.
    failure: Mutex<Option<Failure>>,
    slots: Mutex<V>,
    /// Taken by whichever child completes last.
    receiver: Mutex<Option<R>>,
}

impl<V: Slots, R: Receiver<V::Output>> Aggregate<V, R> {
    fn new(count: usize, slots: V, receiver: R) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            failure: Mutex::new(None),
            slots: Mutex::new(slots),
            receiver: Mutex::new(Some(receiver)),
        })
    }

    fn fail(&self, failure: Failure) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(failure);
        }
    }

    /// Records the completion of one child.
    fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            unreachable!("aggregate completed twice");
        };
        let failure = self.failure.lock().take();
        match failure {
            Some(Failure::Error(error)) => receiver.set_error(error),
            Some(Failure::Stopped) => receiver.set_stopped(),
            None => {
                let values = self.slots.lock().collect();
                receiver.set_value(values);
            }
        }
    }
}

/// Receiver handed to each child. `put` stores the child's value in its slot.
struct Branch<V, R, P> {
    shared: Arc<Aggregate<V, R>>,
    put: P,
}

impl<V: Slots, R: Receiver<V::Output>, P> Branch<V, R, P> {
    fn new<T>(shared: &Arc<Aggregate<V, R>>, put: P) -> Self
    where
        P: FnOnce(&mut V, T),
    {
        Self {
            shared: shared.clone(),
            put,
        }
    }
}

impl<T, V, R, P> Receiver<T> for Branch<V, R, P>
where
    T: Send + 'static,
    V: Slots,
    R: Receiver<V::Output>,
    P: FnOnce(&mut V, T) + Send + 'static,
{
    fn set_value(self, value: T) {
        let mut slots = self.shared.slots.lock();
        (self.put)(&mut *slots, value);
        drop(slots);
        self.shared.arrive();
    }

    fn set_error(self, error: Error) {
        self.shared.fail(Failure::Error(error));
        self.shared.arrive();
    }

    fn set_stopped(self) {
        self.shared.fail(Failure::Stopped);
        self.shared.arrive();
    }
}

struct WhenAllOperation<V, R, O> {
    shared: Arc<Aggregate<V, R>>,
    children: Vec<O>,
}

impl<V, R, O> OperationState for WhenAllOperation<V, R, O>
where
    V: Slots,
    R: Receiver<V::Output>,
    O: OperationState,
{
    fn start(self) {
        if self.children.is_empty() {
            self.shared.finish();
            return;
        }
        for child in self.children {
            child.start();
        }
    }
}

impl<S: Sender> Sender for WhenAll<S> {
    type Output = Vec<S::Output>;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Vec<S::Output>>,
    {
        let count = self.senders.len();
        let slots: Vec<Option<S::Output>> = (0..count).map(|_| None).collect();
        let shared = Aggregate::new(count, slots, receiver);
        let children: Vec<_> = self
            .senders
            .into_iter()
            .enumerate()
            .map(|(index, sender)| {
                sender.connect(Branch::new(
                    &shared,
                    move |slots: &mut Vec<Option<S::Output>>, value| slots[index] = Some(value),
                ))
            })
            .collect();
        WhenAllOperation { shared, children }
    }
}

struct ZipOperation<OA, OB> {
    a: OA,
    b: OB,
}

impl<OA: OperationState, OB: OperationState> OperationState for ZipOperation<OA, OB> {
    fn start(self) {
        self.a.start();
        self.b.start();
    }
}

impl<A: Sender, B: Sender> Sender for Zip<A, B> {
    type Output = (A::Output, B::Output);

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<(A::Output, B::Output)>,
    {
        let slots: (Option<A::Output>, Option<B::Output>) = (None, None);
        let shared = Aggregate::new(2, slots, receiver);
        ZipOperation {
            a: self.a.connect(Branch::new(
                &shared,
                |slots: &mut (Option<A::Output>, Option<B::Output>), value| slots.0 = Some(value),
            )),
            b: self.b.connect(Branch::new(
                &shared,
                |slots: &mut (Option<A::Output>, Option<B::Output>), value| slots.1 = Some(value),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{
        completion::tests::Recorder, just, just_error, just_stopped, sync_wait, transform,
        try_transform, typed_via, NewThreadContext, Outcome, Scheduler,
    };

    fn assert_send<T: Send>() {}

    #[test]
    fn empty_completes_immediately() {
        let (recorder, slot) = Recorder::<Vec<u8>>::new();
        when_all(Vec::<crate::Just<u8>>::new()).connect(recorder).start();
        let outcome = slot.lock().take();
        match outcome {
            Some(Outcome::Value(values)) => assert!(values.is_empty()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn values_keep_positional_order() {
        let ctx = NewThreadContext::new();
        // Earlier children sleep longer, so they complete last.
        let tasks = (0..5u64).map(|i| {
            transform(ctx.scheduler().schedule(), move |()| {
                thread::sleep(Duration::from_millis((5 - i) * 10));
                i
            })
        });
        assert_eq!(sync_wait(when_all(tasks)).unwrap(), Some(vec![0, 1, 2, 3, 4]));
    }

    #[test]
    fn error_wins_over_values() {
        let ctx = NewThreadContext::new();
        let sender = zip(
            typed_via(just_error::<u8>(Error::other("first")), ctx.scheduler()),
            transform(ctx.scheduler().schedule(), |()| {
                thread::sleep(Duration::from_millis(20));
                1u8
            }),
        );
        let err = sync_wait(sender).unwrap_err();
        assert_eq!(err.to_string(), "first");
    }

    #[test]
    fn error_wins_when_it_arrives_last() {
        let ctx = NewThreadContext::new();
        let sender = zip(
            try_transform(ctx.scheduler().schedule(), |()| {
                thread::sleep(Duration::from_millis(20));
                Err::<u8, _>(Error::other("late"))
            }),
            just(2u8),
        );
        let err = sync_wait(sender).unwrap_err();
        assert_eq!(err.to_string(), "late");
    }

    #[test]
    fn first_error_wins() {
        let (recorder, slot) = Recorder::<(u8, u8)>::new();
        zip(just_error(Error::ShutDown), just_error(Error::other("second")))
            .connect(recorder)
            .start();
        assert!(matches!(
            slot.lock().take(),
            Some(Outcome::Error(Error::ShutDown))
        ));
    }

    #[test]
    fn stopped_then_error_reports_stopped() {
        let (recorder, slot) = Recorder::<(u8, u8)>::new();
        zip(just_stopped(), just_error(Error::ShutDown))
            .connect(recorder)
            .start();
        assert!(matches!(slot.lock().take(), Some(Outcome::Stopped)));
    }

    #[test]
    fn zip_is_heterogeneous() {
        let ctx = NewThreadContext::new();
        let sender = zip(
            transform(ctx.scheduler().schedule(), |()| "left"),
            transform(ctx.scheduler().schedule(), |()| 7u32),
        );
        assert_eq!(sync_wait(sender).unwrap(), Some(("left", 7)));
    }

    #[test]
    fn completes_exactly_once_under_contention() {
        let ctx = NewThreadContext::new();
        for _ in 0..20 {
            let tasks = (0..8).map(|i| {
                try_transform(ctx.scheduler().schedule(), move |()| {
                    if i % 2 == 0 {
                        Err(Error::other(format!("task {i}")))
                    } else {
                        Ok(i)
                    }
                })
            });
            let (recorder, slot) = Recorder::<Vec<i32>>::new();
            when_all(tasks).connect(recorder).start();
            // Recorder asserts it is completed only once.
            while slot.lock().is_none() {
                thread::yield_now();
            }
            assert!(matches!(
                slot.lock().take(),
                Some(Outcome::Error(Error::Other(_)))
            ));
        }
    }

    #[test]
    fn senders_are_send() {
        assert_send::<WhenAll<crate::Just<u8>>>();
        assert_send::<Zip<crate::Just<u8>, crate::Just<()>>>();
    }
}
