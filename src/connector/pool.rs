//! Bounded worker thread pool
//!
//! Admission follows the classic executor rules: below the core size a new
//! thread is started for the task, otherwise the task is queued, and when
//! the queue is full a thread is added up to the maximum size. Anything
//! else is rejected through the rejection handler; submitters never see a
//! panic or an error.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::config::ConnectorConfig;

/// Unit of work run by a worker thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked with pool diagnostics when a task is rejected
pub type RejectionHandler = Arc<dyn Fn(&PoolStats) + Send + Sync>;

/// Queueing discipline between submitters and workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDiscipline {
    /// No queueing: a task is accepted only if a thread can take it now
    HandOff,
    /// Unlimited queue; never rejects while running
    Unbounded,
    /// Queue holding at most N tasks
    Bounded(usize),
}

impl QueueDiscipline {
    /// Select the discipline from the `maxQueued` parameter:
    /// `0` hands off, negative is unbounded, `N` is bounded
    #[must_use]
    pub fn from_max_queued(max_queued: i64) -> Self {
        match max_queued {
            0 => Self::HandOff,
            n if n < 0 => Self::Unbounded,
            n => Self::Bounded(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }

    fn channel(self) -> (Sender<Task>, Receiver<Task>) {
        match self {
            Self::HandOff => bounded(0),
            Self::Unbounded => unbounded(),
            Self::Bounded(capacity) => bounded(capacity),
        }
    }
}

/// Sizing of a worker pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Prefix of worker thread names
    pub name: String,
    /// Threads kept alive even when idle
    pub core_threads: usize,
    /// Upper bound on live threads
    pub max_threads: usize,
    /// Queue between submitters and workers
    pub queue: QueueDiscipline,
    /// Idle time after which a thread above the core size exits
    pub keep_alive: Duration,
}

impl PoolSettings {
    /// Derive pool settings from connector parameters
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &ConnectorConfig) -> Self {
        Self {
            name: name.into(),
            core_threads: config.min_threads,
            max_threads: config.max_threads,
            queue: QueueDiscipline::from_max_queued(config.max_queued),
            keep_alive: Duration::from_millis(config.max_thread_idle_time_ms),
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Tasks currently running
    pub active: usize,
    /// Tasks that ran to completion (or panicked)
    pub completed: u64,
    /// Tasks accepted so far
    pub scheduled: u64,
    /// Tasks refused
    pub rejected: u64,
    /// Core pool size
    pub core: usize,
    /// Maximum pool size
    pub max: usize,
    /// Live threads
    pub current: usize,
    /// Highest number of live threads seen
    pub largest: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queued tasks: {}, active tasks: {}, completed tasks: {}, scheduled tasks: {}, \
             rejected tasks: {}, core pool size: {}, maximum pool size: {}, \
             current pool size: {}, largest pool size: {}",
            self.queued,
            self.active,
            self.completed,
            self.scheduled,
            self.rejected,
            self.core,
            self.max,
            self.current,
            self.largest
        )
    }
}

#[derive(Debug, Default)]
struct PoolState {
    threads: usize,
    largest: usize,
    spawned: u64,
    shutdown: bool,
}

struct PoolInner {
    name: String,
    core: usize,
    max: usize,
    keep_alive: Duration,
    queue: QueueDiscipline,
    tasks_tx: Sender<Task>,
    tasks_rx: Receiver<Task>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    state: Mutex<PoolState>,
    terminated: Condvar,
    active: AtomicUsize,
    completed: AtomicU64,
    scheduled: AtomicU64,
    rejected: AtomicU64,
    on_rejected: RejectionHandler,
}

/// Handle on a worker pool; clones share the same threads
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool that logs rejections
    #[must_use]
    pub fn new(settings: PoolSettings) -> Self {
        let name = settings.name.clone();
        Self::with_rejection_handler(
            settings,
            Arc::new(move |stats: &PoolStats| {
                warn!("Unable to run the following {} task. {}", name, stats);
            }),
        )
    }

    /// Create a pool with a custom rejection handler
    #[must_use]
    pub fn with_rejection_handler(settings: PoolSettings, on_rejected: RejectionHandler) -> Self {
        let (tasks_tx, tasks_rx) = settings.queue.channel();
        let (shutdown_tx, shutdown_rx) = bounded(0);
        let max = settings.max_threads.max(settings.core_threads).max(1);

        Self {
            inner: Arc::new(PoolInner {
                name: settings.name,
                core: settings.core_threads,
                max,
                keep_alive: settings.keep_alive,
                queue: settings.queue,
                tasks_tx,
                tasks_rx,
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                shutdown_rx,
                state: Mutex::new(PoolState::default()),
                terminated: Condvar::new(),
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                scheduled: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                on_rejected,
            }),
        }
    }

    /// Submit a task
    ///
    /// Returns whether the task was accepted. A refused task is dropped
    /// after the rejection handler ran.
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = &self.inner;
        let task: Task = Box::new(task);
        let mut state = inner.state.lock();

        if state.shutdown {
            drop(state);
            self.reject();
            return false;
        }

        if state.threads < inner.core {
            let started = inner.spawn_worker(&mut state, Some(task));
            drop(state);
            return self.accepted(started);
        }

        match inner.tasks_tx.try_send(task) {
            Ok(()) => {
                // A queued task needs at least one live thread to pick it up
                if state.threads == 0 {
                    inner.spawn_worker(&mut state, None);
                }
                drop(state);
                self.accepted(true)
            }
            Err(TrySendError::Full(task) | TrySendError::Disconnected(task)) => {
                if state.threads < inner.max {
                    let started = inner.spawn_worker(&mut state, Some(task));
                    drop(state);
                    self.accepted(started)
                } else {
                    drop(state);
                    drop(task);
                    self.reject();
                    false
                }
            }
        }
    }

    fn accepted(&self, started: bool) -> bool {
        if started {
            self.inner.scheduled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reject();
        }
        started
    }

    fn reject(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
        (self.inner.on_rejected)(&self.stats());
    }

    /// Start every core thread ahead of the first submission
    ///
    /// Returns the number of threads started.
    pub fn prestart_core_threads(&self) -> usize {
        let mut state = self.inner.state.lock();
        let mut started = 0;

        while !state.shutdown && state.threads < self.inner.core {
            if !self.inner.spawn_worker(&mut state, None) {
                break;
            }
            started += 1;
        }

        started
    }

    /// Stop accepting tasks; queued tasks still run
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }

        state.shutdown = true;
        // Dropping the sender wakes every idle worker
        self.inner.shutdown_tx.lock().take();

        if state.threads == 0 {
            self.inner.terminated.notify_all();
        }

        debug!("{} worker pool shut down", self.inner.name);
    }

    /// Whether `shutdown` was called
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    /// Whether the pool is shut down and every thread has exited
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        let state = self.inner.state.lock();
        state.shutdown && state.threads == 0
    }

    /// Wait until every thread exited after shutdown
    ///
    /// Returns `false` if the timeout elapsed first.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();

        while !(state.shutdown && state.threads == 0) {
            if self
                .inner
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.shutdown && state.threads == 0;
            }
        }

        true
    }

    /// Number of tasks currently running
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Queue discipline in use
    #[must_use]
    pub fn queue_discipline(&self) -> QueueDiscipline {
        self.inner.queue
    }

    /// Snapshot of the pool counters
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let (current, largest) = {
            let state = self.inner.state.lock();
            (state.threads, state.largest)
        };

        PoolStats {
            queued: self.inner.tasks_rx.len(),
            active: self.active_count(),
            completed: self.inner.completed.load(Ordering::Relaxed),
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            core: self.inner.core,
            max: self.inner.max,
            current,
            largest,
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

enum Next {
    Run(Task),
    Idle,
    Shutdown,
}

impl PoolInner {
    /// Start a worker thread, counted under the state lock
    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState, first: Option<Task>) -> bool {
        state.spawned += 1;
        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{}-worker-{}", self.name, state.spawned))
            .spawn(move || inner.run_worker(first));

        match spawned {
            Ok(_) => {
                state.threads += 1;
                state.largest = state.largest.max(state.threads);
                true
            }
            Err(e) => {
                error!("Unable to start a {} worker thread: {}", self.name, e);
                false
            }
        }
    }

    fn run_worker(self: Arc<Self>, first: Option<Task>) {
        if let Some(task) = first {
            self.run_task(task);
        }

        loop {
            let timed = self.state.lock().threads > self.core;

            let next = if timed {
                select! {
                    recv(self.tasks_rx) -> task => task.map_or(Next::Shutdown, Next::Run),
                    recv(self.shutdown_rx) -> _ => Next::Shutdown,
                    default(self.keep_alive) => Next::Idle,
                }
            } else {
                select! {
                    recv(self.tasks_rx) -> task => task.map_or(Next::Shutdown, Next::Run),
                    recv(self.shutdown_rx) -> _ => Next::Shutdown,
                }
            };

            match next {
                Next::Run(task) => self.run_task(task),
                Next::Idle => {
                    let mut state = self.state.lock();
                    if state.threads > self.core {
                        self.worker_exited(&mut state);
                        return;
                    }
                }
                Next::Shutdown => {
                    while let Ok(task) = self.tasks_rx.try_recv() {
                        self.run_task(task);
                    }
                    let mut state = self.state.lock();
                    self.worker_exited(&mut state);
                    return;
                }
            }
        }
    }

    fn worker_exited(&self, state: &mut PoolState) {
        state.threads -= 1;
        if state.shutdown && state.threads == 0 {
            self.terminated.notify_all();
        }
    }

    fn run_task(&self, task: Task) {
        let guard = ActiveGuard::new(&self.active);

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("A {} worker task panicked", self.name);
        }

        drop(guard);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counts a running task for as long as it lives
struct ActiveGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn new(active: &'a AtomicUsize) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self { active }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
