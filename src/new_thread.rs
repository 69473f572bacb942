//! A scheduler that runs every scheduled operation on a freshly spawned thread.
//!
//! [`NewThreadContext`] owns all threads it spawns. Dropping it blocks until every one of them has
//! exited, which includes running the destructors of their thread-local variables. After the
//! destructor returns, nothing scheduled on the context can still be running.

use std::{
    any::Any,
    fmt, mem,
    panic::resume_unwind,
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};

use crate::{Error, OperationState, Receiver, Scheduler, Sender};

/// A builder object that can be used to configure and create a [`NewThreadContext`].
#[derive(Debug, Clone, Default)]
pub struct NewThreadContextBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl NewThreadContextBuilder {
    /// Sets the base name of the spawned threads.
    ///
    /// Each thread will be named according to this base name and the index of the schedule
    /// operation that spawned it, like `io-0`, `io-1`, ...
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the stack size of the spawned threads, in bytes.
    #[inline]
    pub fn stack_size(self, stack_size: usize) -> Self {
        Self {
            stack_size: Some(stack_size),
            ..self
        }
    }

    /// Creates the [`NewThreadContext`].
    ///
    /// No threads are spawned until an operation is scheduled on the context.
    pub fn build(self) -> NewThreadContext {
        NewThreadContext {
            shared: Arc::new(Shared {
                name: self.name,
                stack_size: self.stack_size,
                state: Mutex::new(State {
                    phase: Phase::Active,
                    spawned: 0,
                    threads: Vec::new(),
                    reaping: 0,
                    panic: None,
                }),
                reaped: Condvar::new(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Accepting schedule operations.
    Active,
    /// The context is being dropped. Operations scheduled from still-running workers are accepted.
    ShuttingDown,
    /// Every thread has been joined. Schedule operations fail with [`Error::ShutDown`].
    Drained,
}

struct State {
    phase: Phase,
    /// Number of threads spawned so far, used to name them.
    spawned: usize,
    /// Threads that have not been joined yet.
    threads: Vec<JoinHandle<()>>,
    /// Number of schedule operations currently joining finished threads they took from `threads`.
    reaping: usize,
    /// Payload of the first worker panic, if it was collected before shutdown.
    panic: Option<Box<dyn Any + Send>>,
}

impl State {
    /// Takes the handles of all threads that have already returned from their main function.
    fn take_finished(&mut self) -> Vec<JoinHandle<()>> {
        let (finished, running) = mem::take(&mut self.threads)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.threads = running;
        if !finished.is_empty() {
            self.reaping += 1;
        }
        finished
    }
}

struct Shared {
    name: Option<String>,
    stack_size: Option<usize>,
    state: Mutex<State>,
    /// Signalled when a schedule operation is done joining the threads it took.
    reaped: Condvar,
}

impl Shared {
    /// Joins threads taken with [`State::take_finished`].
    ///
    /// Joining happens without holding the lock, since a finished thread may still be running
    /// thread-local destructors that schedule more work.
    fn reap(&self, finished: Vec<JoinHandle<()>>) {
        if finished.is_empty() {
            return;
        }
        let mut payload = None;
        for handle in finished {
            if let Err(pl) = handle.join() {
                payload.get_or_insert(pl);
            }
        }
        let mut state = self.state.lock();
        if let Some(payload) = payload {
            state.panic.get_or_insert(payload);
        }
        state.reaping -= 1;
        self.reaped.notify_all();
    }
}

/// An execution context that spawns a new thread for each scheduled operation.
///
/// This type enforces structured concurrency: when it's dropped, it waits until all threads it has
/// spawned have exited, including the ones spawned while it is shutting down (for example, by a
/// continuation that schedules more work on the same context). Thread-local variables of these
/// threads are destroyed before [`Drop`] returns.
///
/// If a worker thread panicked, the panic is forwarded to the thread dropping the
/// [`NewThreadContext`]. Panics from user callables passed to [`transform`][crate::transform()] are
/// caught and turned into error completions instead; only a panic in a receiver itself, which has
/// no receiver left to report it to, takes this path.
///
/// The context must not be dropped from one of its own worker threads, since that thread would
/// wait for itself to exit.
///
/// # Examples
///
/// ```
/// use defewwed::{sync_wait, transform, when_all, NewThreadContext, Scheduler};
///
/// let ctx = NewThreadContext::builder().name("worker").build();
/// let tasks = (1..=4).map(|i| transform(ctx.scheduler().schedule(), move |()| i));
/// assert_eq!(sync_wait(when_all(tasks)).unwrap(), Some(vec![1, 2, 3, 4]));
/// assert_eq!(ctx.spawned(), 4);
/// drop(ctx); // joins all four threads
/// ```
pub struct NewThreadContext {
    shared: Arc<Shared>,
}

impl NewThreadContext {
    /// Creates an unnamed [`NewThreadContext`] with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder that can be used to configure a [`NewThreadContext`].
    #[inline]
    pub fn builder() -> NewThreadContextBuilder {
        NewThreadContextBuilder::default()
    }

    /// Returns a scheduler that schedules work on this context.
    pub fn scheduler(&self) -> NewThreadScheduler {
        NewThreadScheduler {
            shared: self.shared.clone(),
        }
    }

    /// Returns the number of threads this context has spawned so far.
    pub fn spawned(&self) -> usize {
        self.shared.state.lock().spawned
    }

    fn wait_for_exit(&mut self) {
        log::debug!("{} shutting down", self.shared);
        self.shared.state.lock().phase = Phase::ShuttingDown;

        // Threads may schedule more work on this context before they exit, so keep joining until
        // no new threads show up.
        let mut payload = None;
        loop {
            let threads = {
                let mut state = self.shared.state.lock();
                while state.threads.is_empty() && state.reaping > 0 {
                    self.shared.reaped.wait(&mut state);
                }
                if state.threads.is_empty() {
                    state.phase = Phase::Drained;
                    payload = state.panic.take().or(payload);
                    break;
                }
                mem::take(&mut state.threads)
            };
            for handle in threads {
                if let Err(pl) = handle.join() {
                    payload.get_or_insert(pl);
                }
            }
        }
        log::debug!("{} drained", self.shared);

        if let Some(payload) = payload {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }
}

impl Default for NewThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NewThreadContext {
    fn drop(&mut self) {
        self.wait_for_exit();
    }
}

impl fmt::Debug for NewThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewThreadContext")
            .field("name", &self.shared.name)
            .field("spawned", &self.spawned())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "new-thread context '{name}'"),
            None => f.write_str("new-thread context"),
        }
    }
}

/// A [`Scheduler`] handle for a [`NewThreadContext`].
///
/// Handles are cheap to clone and may outlive the context. Schedule operations started after the
/// context has finished shutting down complete with [`Error::ShutDown`].
#[derive(Clone)]
pub struct NewThreadScheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for NewThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewThreadScheduler")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for NewThreadScheduler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for NewThreadScheduler {}

impl Scheduler for NewThreadScheduler {
    type Schedule = NewThreadSchedule;

    fn schedule(&self) -> NewThreadSchedule {
        NewThreadSchedule {
            shared: self.shared.clone(),
        }
    }
}

/// Sender returned by [`NewThreadScheduler::schedule`].
///
/// Starting the connected operation spawns a thread that completes the receiver with `()` and
/// then exits. If the thread cannot be spawned, the receiver is completed with [`Error::Spawn`] on
/// the starting thread.
#[derive(Clone)]
pub struct NewThreadSchedule {
    shared: Arc<Shared>,
}

impl Sender for NewThreadSchedule {
    type Output = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<()>,
    {
        NewThreadOperation {
            shared: self.shared,
            receiver,
        }
    }
}

struct NewThreadOperation<R> {
    shared: Arc<Shared>,
    receiver: R,
}

impl<R: Receiver<()>> OperationState for NewThreadOperation<R> {
    fn start(self) {
        let Self { shared, receiver } = self;

        // The receiver is only handed to the thread once it exists, so that a spawn failure can
        // still complete it.
        let (handoff, inbox) = crossbeam_channel::bounded::<R>(1);

        let mut finished = Vec::new();
        let spawned = {
            let mut state = shared.state.lock();
            if state.phase == Phase::Drained {
                None
            } else {
                finished = state.take_finished();

                let index = state.spawned;
                let mut builder = thread::Builder::new();
                if let Some(name) = &shared.name {
                    builder = builder.name(format!("{name}-{index}"));
                }
                if let Some(stack_size) = shared.stack_size {
                    builder = builder.stack_size(stack_size);
                }
                let ctx = shared.clone();
                let res = builder.spawn(move || {
                    log::trace!("{ctx}: worker {index} starting");
                    if let Ok(receiver) = inbox.recv() {
                        receiver.set_value(());
                    }
                    log::trace!("{ctx}: worker {index} exiting");
                });
                Some(res.map(|handle| {
                    state.spawned += 1;
                    state.threads.push(handle);
                }))
            }
        };
        shared.reap(finished);

        // Completions happen outside of the lock, since receivers may schedule more work.
        match spawned {
            None => {
                log::debug!("{shared} refused a schedule operation after shutting down");
                receiver.set_error(Error::ShutDown);
            }
            Some(Err(e)) => {
                log::debug!("{shared} failed to spawn a worker: {e}");
                receiver.set_error(Error::Spawn(e));
            }
            Some(Ok(_)) => {
                if let Err(crossbeam_channel::SendError(receiver)) = handoff.send(receiver) {
                    receiver.set_error(Error::Abandoned);
                }
            }
        }
    }
}
