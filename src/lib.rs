//! A small library for composing deferred work out of senders, receivers and schedulers.
//!
//! (if you're looking for a full `async` runtime, this isn't it; this crate is about describing a
//! graph of work up front and deciding *where* each piece runs, with plain OS threads underneath)
//!
//! # Overview
//!
//! A [`Sender`] is a description of some work that has not started yet. Senders are plain values:
//! they can be moved around and wrapped in combinators to build larger senders, and nothing happens
//! until they are connected to a [`Receiver`] and started.
//!
//! Every started operation completes its receiver exactly once, in exactly one of three ways:
//!
//! - with a **value** ([`Receiver::set_value`]),
//! - with an **error** ([`Receiver::set_error`]), or
//! - by being **stopped** ([`Receiver::set_stopped`]), which carries no payload.
//!
//! Combinators route errors and stopped signals through untouched; only code that explicitly asks
//! for them ever sees them.
//!
//! ## Combinators
//!
//! - [`transform`] maps a value through a function, on whatever thread the value arrives on.
//! - [`typed_via`] moves a completion onto a [`Scheduler`]'s execution context.
//! - [`then_execute`] does both: hop onto a scheduler, then apply a function there.
//! - [`when_all`] and [`zip`] join independent senders and wait for all of them.
//!
//! ## Schedulers
//!
//! A [`Scheduler`] hands out schedule senders, which complete once they run on the scheduler's
//! execution context. [`NewThreadContext`] is a scheduler context that spawns a thread per
//! scheduled operation, and enforces *structured concurrency*: dropping it waits for all of those
//! threads to exit, including the destruction of their thread-local variables.
//!
//! ## Waiting
//!
//! [`sync_wait`] starts a sender and blocks until it completes. It's the only blocking operation
//! in this crate.
//!
//! # Usage
//!
//! Run four tasks on their own threads and wait for all of them:
//!
//! ```
//! use defewwed::{sync_wait, transform, when_all, NewThreadContext, Scheduler};
//!
//! let ctx = NewThreadContext::builder().name("task").build();
//!
//! let task = |i: u32| {
//!     transform(ctx.scheduler().schedule(), move |()| {
//!         println!("task {i} running on {:?}", std::thread::current().name());
//!         i * i
//!     })
//! };
//!
//! let squares = sync_wait(when_all([task(1), task(2), task(3), task(4)]))
//!     .expect("no task failed")
//!     .expect("no task was stopped");
//! assert_eq!(squares, [1, 4, 9, 16]);
//!
//! // Joins every thread the context has spawned.
//! drop(ctx);
//! ```
//!
//! Chain work across contexts with the [`SenderExt`] methods:
//!
//! ```
//! use defewwed::{NewThreadContext, Scheduler, SenderExt};
//!
//! let io = NewThreadContext::builder().name("io").build();
//! let cpu = NewThreadContext::builder().name("cpu").build();
//!
//! let len = io
//!     .scheduler()
//!     .schedule()
//!     .transform(|()| String::from("pretend this was read from a file"))
//!     .then_execute(cpu.scheduler(), |text| text.len())
//!     .sync_wait()
//!     .unwrap();
//! assert_eq!(len, Some(33));
//! ```

mod completion;
mod error;
mod just;
mod new_thread;
mod scheduler;
mod sync_wait;
mod transform;
mod via;
mod when_all;

pub use completion::{connect, OperationState, Outcome, Receiver, Sender};
pub use error::{Error, Panic, Result};
pub use just::{just, just_error, just_stopped, Just, JustError, JustStopped};
pub use new_thread::{
    NewThreadContext, NewThreadContextBuilder, NewThreadSchedule, NewThreadScheduler,
};
pub use scheduler::{schedule, InlineSchedule, InlineScheduler, Scheduler};
pub use sync_wait::sync_wait;
pub use transform::{transform, try_transform, Transform, TryTransform};
pub use via::{then_execute, typed_via, TypedVia};
pub use when_all::{when_all, zip, WhenAll, Zip};

/// Method-chaining versions of the combinators, available on every [`Sender`].
pub trait SenderExt: Sender + Sized {
    /// See [`transform`].
    #[inline]
    fn transform<F, U>(self, func: F) -> Transform<Self, F>
    where
        F: FnOnce(Self::Output) -> U + Send + 'static,
        U: Send + 'static,
    {
        transform(self, func)
    }

    /// See [`try_transform`].
    #[inline]
    fn try_transform<F, U>(self, func: F) -> TryTransform<Self, F>
    where
        F: FnOnce(Self::Output) -> Result<U> + Send + 'static,
        U: Send + 'static,
    {
        try_transform(self, func)
    }

    /// See [`typed_via`].
    #[inline]
    fn typed_via<Sch: Scheduler>(self, scheduler: Sch) -> TypedVia<Self, Sch> {
        typed_via(self, scheduler)
    }

    /// See [`then_execute`].
    #[inline]
    fn then_execute<Sch, F, U>(self, scheduler: Sch, func: F) -> Transform<TypedVia<Self, Sch>, F>
    where
        Sch: Scheduler,
        F: FnOnce(Self::Output) -> U + Send + 'static,
        U: Send + 'static,
    {
        then_execute(scheduler, self, func)
    }

    /// See [`zip`].
    #[inline]
    fn zip<B: Sender>(self, other: B) -> Zip<Self, B> {
        zip(self, other)
    }

    /// See [`sync_wait`].
    #[inline]
    fn sync_wait(self) -> Result<Option<Self::Output>> {
        sync_wait(self)
    }
}

impl<S: Sender> SenderExt for S {}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn chained_pipeline() {
        let ctx = NewThreadContext::builder().name("chain").build();
        let out = just(3)
            .transform(|x| x + 1)
            .then_execute(ctx.scheduler(), |x| {
                (x * 2, thread::current().name().map(String::from))
            })
            .zip(just("side"))
            .sync_wait()
            .unwrap()
            .unwrap();
        assert_eq!(out.0 .0, 8);
        assert_eq!(out.0 .1.as_deref(), Some("chain-0"));
        assert_eq!(out.1, "side");
    }

    #[test]
    fn try_transform_chain_short_circuits() {
        let out = just(1)
            .try_transform(|_| Err::<i32, _>(Error::other("stop here")))
            .transform(|x| x + 1)
            .sync_wait();
        assert_eq!(out.unwrap_err().to_string(), "stop here");
    }

    #[test]
    fn inline_scheduler_chain() {
        let me = thread::current().id();
        let out = schedule(&InlineScheduler)
            .transform(|()| thread::current().id())
            .typed_via(InlineScheduler)
            .sync_wait()
            .unwrap();
        assert_eq!(out, Some(me));
    }
}
