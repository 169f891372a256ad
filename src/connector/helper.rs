//! Connector helper: message queues, controller and worker dispatch

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hyper::StatusCode;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::ConnectorConfig;
use crate::{ConnegError, Result};

use super::controller::Controller;
use super::message::Message;
use super::pool::{PoolSettings, WorkerPool};
use super::{CONTROLLER_STOP_TIMEOUT, WORKER_STOP_TIMEOUT};

/// Side of the connection a helper serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Client connector
    Client,
    /// Server connector
    Server,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client-side"),
            Self::Server => f.write_str("server-side"),
        }
    }
}

/// Lifecycle of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Not started, or fully stopped
    Stopped,
    /// Creating the pool and controller
    Starting,
    /// Dispatching messages
    Running,
    /// Letting in-flight work finish
    GracefullyStopping,
}

/// What a transport does with each message
///
/// The helper owns queues and threads; the handler owns the semantics.
pub trait MessageHandler: Send + Sync + Sized + 'static {
    /// Handle a message taken from the inbound queue
    fn handle_inbound(&self, helper: &ConnectorHelper<Self>, message: Message);

    /// Handle a message taken from the outbound queue
    fn handle_outbound(&self, helper: &ConnectorHelper<Self>, message: Message);

    /// Called when a message was dropped by the admission gate
    fn message_dropped(&self, _id: u64) {}
}

struct Inner<H> {
    side: Side,
    name: String,
    config: ConnectorConfig,
    handler: H,
    inbound_tx: Sender<Message>,
    inbound_rx: Receiver<Message>,
    outbound_tx: Sender<Message>,
    outbound_rx: Receiver<Message>,
    state: Mutex<ConnectorState>,
    pool: RwLock<Option<WorkerPool>>,
    controller: RwLock<Option<Arc<Controller>>>,
}

/// Decouples connection I/O from message handling
///
/// Clones share the same queues, pool and controller.
pub struct ConnectorHelper<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for ConnectorHelper<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: MessageHandler> ConnectorHelper<H> {
    /// Create a stopped helper
    #[must_use]
    pub fn new(side: Side, name: impl Into<String>, config: ConnectorConfig, handler: H) -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();

        Self {
            inner: Arc::new(Inner {
                side,
                name: name.into(),
                config,
                handler,
                inbound_tx,
                inbound_rx,
                outbound_tx,
                outbound_rx,
                state: Mutex::new(ConnectorState::Stopped),
                pool: RwLock::new(None),
                controller: RwLock::new(None),
            }),
        }
    }

    /// Start the worker pool (when enabled) and the controller thread
    ///
    /// # Errors
    ///
    /// Returns error if the helper is not stopped or a thread cannot start
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != ConnectorState::Stopped {
                return Err(ConnegError::InvalidState(
                    format!("{:?}", *state).to_lowercase(),
                ));
            }
            *state = ConnectorState::Starting;
        }

        let config = &self.inner.config;

        if config.worker_threads {
            let pool = WorkerPool::new(PoolSettings::from_config(self.inner.name.clone(), config));
            pool.prestart_core_threads();
            *self.inner.pool.write() = Some(pool);
        }

        let weak: Weak<Inner<H>> = Arc::downgrade(&self.inner);
        let spawned = Controller::spawn(
            &self.inner.name,
            Duration::from_millis(config.controller_sleep_time_ms),
            config.controller_daemon,
            move || {
                weak.upgrade()
                    .is_some_and(|inner| ConnectorHelper { inner }.control())
            },
        );

        let controller = match spawned {
            Ok(controller) => controller,
            Err(e) => {
                if let Some(pool) = self.inner.pool.write().take() {
                    pool.shutdown();
                }
                *self.inner.state.lock() = ConnectorState::Stopped;
                return Err(e.into());
            }
        };

        *self.inner.controller.write() = Some(Arc::new(controller));
        *self.inner.state.lock() = ConnectorState::Running;

        info!(
            "Started {} {} connector (worker threads: {}, direct buffers: {})",
            self.inner.side,
            self.inner.name,
            config.worker_threads,
            config.is_direct_buffers()
        );

        Ok(())
    }

    /// Stop gracefully: queued work completes, waits are bounded
    ///
    /// Stopping a helper that is not running does nothing.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != ConnectorState::Running {
                return;
            }
            *state = ConnectorState::GracefullyStopping;
        }

        let pool = self.inner.pool.read().clone();
        if let Some(pool) = pool {
            pool.shutdown();
            if !pool.await_termination(WORKER_STOP_TIMEOUT) {
                debug!(
                    "Timeout while waiting for {} workers to terminate",
                    self.inner.name
                );
            }
        }

        let controller = self.inner.controller.read().clone();
        if let Some(controller) = controller {
            if !controller.stop(CONTROLLER_STOP_TIMEOUT) {
                debug!(
                    "Timeout while waiting for the {} controller to terminate",
                    self.inner.name
                );
            }
        }

        self.inner.pool.write().take();
        self.inner.controller.write().take();
        *self.inner.state.lock() = ConnectorState::Stopped;

        info!("Stopped {} {} connector", self.inner.side, self.inner.name);
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        *self.inner.state.lock()
    }

    /// Side served
    #[must_use]
    pub fn side(&self) -> Side {
        self.inner.side
    }

    /// Connector parameters
    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    /// Transport handler
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// Worker pool, while running with worker threads
    #[must_use]
    pub fn worker_pool(&self) -> Option<WorkerPool> {
        self.inner.pool.read().clone()
    }

    /// Whether the controller loop is alive
    #[must_use]
    pub fn is_controller_running(&self) -> bool {
        self.inner
            .controller
            .read()
            .as_ref()
            .is_some_and(|controller| controller.is_running())
    }

    /// Messages waiting in the inbound queue
    #[must_use]
    pub fn inbound_len(&self) -> usize {
        self.inner.inbound_rx.len()
    }

    /// Messages waiting in the outbound queue
    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.inner.outbound_rx.len()
    }

    /// Queue a message for inbound handling
    pub fn submit_inbound(&self, message: Message) {
        // The helper holds the receiver, so the queue never disconnects
        self.inner.inbound_tx.send(message).ok();
        self.wake_controller();
    }

    /// Queue a message for outbound handling
    pub fn submit_outbound(&self, message: Message) {
        self.inner.outbound_tx.send(message).ok();
        self.wake_controller();
    }

    fn wake_controller(&self) {
        if let Some(controller) = self.inner.controller.read().as_ref() {
            controller.wake();
        }
    }

    /// Run one control cycle
    ///
    /// Handles as many messages as each queue held when the cycle began,
    /// inbound first. Returns whether any message was handled.
    pub fn control(&self) -> bool {
        let mut activity = false;

        let size = self.inner.inbound_rx.len();
        for _ in 0..size {
            match self.inner.inbound_rx.try_recv() {
                Ok(message) => {
                    activity = true;
                    self.handle_inbound(message, false);
                }
                Err(_) => break,
            }
        }

        let size = self.inner.outbound_rx.len();
        for _ in 0..size {
            match self.inner.outbound_rx.try_recv() {
                Ok(message) => {
                    activity = true;
                    self.handle_outbound(message, false);
                }
                Err(_) => break,
            }
        }

        activity
    }

    /// Handle an inbound message, on a worker unless `synchronous`
    pub fn handle_inbound(&self, message: Message, synchronous: bool) {
        if self.inner.config.tracing {
            info!(
                "Handling inbound message {} ({} {})",
                message.id(),
                message.request().method,
                message.request().path
            );
        }

        if synchronous || self.worker_pool().is_none() {
            self.inner.handler.handle_inbound(self, message);
            return;
        }

        let id = message.id();
        let helper = self.clone();
        if !self.execute(move || helper.inner.handler.handle_inbound(&helper, message)) {
            self.inner.handler.message_dropped(id);
        }
    }

    /// Handle an outbound message, on a worker unless `synchronous`
    pub fn handle_outbound(&self, message: Message, synchronous: bool) {
        if self.inner.config.tracing {
            info!(
                "Handling outbound message {} ({:?})",
                message.id(),
                message.status()
            );
        }

        if synchronous || self.worker_pool().is_none() {
            self.inner.handler.handle_outbound(self, message);
            return;
        }

        let id = message.id();
        let helper = self.clone();
        if !self.execute(move || helper.inner.handler.handle_outbound(&helper, message)) {
            self.inner.handler.message_dropped(id);
        }
    }

    /// Run a task on the worker pool if the admission gate lets it through
    ///
    /// The gate requires the pool to exist, not be overloaded or shut down,
    /// and the controller to be running. Otherwise the task is dropped.
    /// Returns whether the pool accepted the task.
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(pool) = self.worker_pool() else {
            debug!("Dropping a {} task: no worker pool", self.inner.side);
            return false;
        };

        if self.is_worker_service_overloaded() {
            debug!("Dropping a {} task: worker service overloaded", self.inner.side);
            self.trace_worker_service();
            return false;
        }

        if pool.is_shutdown() {
            debug!("Dropping a {} task: worker service shut down", self.inner.side);
            return false;
        }

        if !self.is_controller_running() {
            debug!("Dropping a {} task: controller stopped", self.inner.side);
            return false;
        }

        pool.execute(task)
    }

    /// Whether busy workers reached the `lowThreads` threshold
    #[must_use]
    pub fn is_worker_service_overloaded(&self) -> bool {
        self.worker_pool()
            .is_some_and(|pool| pool.active_count() >= self.inner.config.low_threads)
    }

    /// Log the worker pool diagnostics at debug level
    pub fn trace_worker_service(&self) {
        match self.worker_pool() {
            Some(pool) => debug!(
                "{} worker service state: {:?}, {}",
                self.inner.name,
                self.state(),
                pool.stats()
            ),
            None => debug!("{} has no worker service", self.inner.name),
        }
    }

    /// Deliver an inbound failure back through the inbound queue
    pub fn on_inbound_error(&self, status: StatusCode, mut message: Message) {
        message.set_status(status);
        self.submit_inbound(message);
    }

    /// Report an outbound failure to the message's error channel, then
    /// deliver it back through the inbound queue
    pub fn on_outbound_error(&self, status: StatusCode, mut message: Message) {
        message.set_status(status);
        message.report_error(status);
        self.submit_inbound(message);
    }
}

impl<H> fmt::Debug for ConnectorHelper<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorHelper")
            .field("side", &self.inner.side)
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::message::RequestHead;
    use hyper::Method;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        inbound: Mutex<Vec<(u64, Option<StatusCode>)>>,
        outbound: Mutex<Vec<u64>>,
        dropped: Mutex<Vec<u64>>,
        release: AtomicBool,
        blocking: AtomicBool,
        busy: AtomicUsize,
    }

    impl MessageHandler for Arc<Recorder> {
        fn handle_inbound(&self, _helper: &ConnectorHelper<Self>, message: Message) {
            if self.blocking.load(Ordering::SeqCst) {
                self.busy.fetch_add(1, Ordering::SeqCst);
                while !self.release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            self.inbound.lock().push((message.id(), message.status()));
        }

        fn handle_outbound(&self, _helper: &ConnectorHelper<Self>, message: Message) {
            self.outbound.lock().push(message.id());
        }

        fn message_dropped(&self, id: u64) {
            self.dropped.lock().push(id);
        }
    }

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            controller_sleep_time_ms: 60_000,
            ..ConnectorConfig::default()
        }
    }

    fn message(id: u64, config: &ConnectorConfig) -> Message {
        Message::new(id, RequestHead::new(Method::GET, "/"), config)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_lifecycle() {
        let helper = ConnectorHelper::new(Side::Server, "test", config(), Arc::new(Recorder::default()));
        assert_eq!(helper.state(), ConnectorState::Stopped);

        helper.start().unwrap();
        assert_eq!(helper.state(), ConnectorState::Running);
        assert!(helper.worker_pool().is_some());
        assert!(helper.is_controller_running());
        assert!(helper.start().is_err());

        helper.stop();
        assert_eq!(helper.state(), ConnectorState::Stopped);
        assert!(helper.worker_pool().is_none());

        // restartable
        helper.start().unwrap();
        helper.stop();
    }

    #[test]
    fn test_control_without_worker_threads_is_synchronous() {
        let config = ConnectorConfig {
            worker_threads: false,
            ..config()
        };
        let recorder = Arc::new(Recorder::default());
        let helper = ConnectorHelper::new(Side::Server, "sync", config.clone(), Arc::clone(&recorder));

        helper.inner.inbound_tx.send(message(1, &config)).unwrap();
        helper.inner.inbound_tx.send(message(2, &config)).unwrap();
        helper.inner.outbound_tx.send(message(3, &config)).unwrap();

        assert!(helper.control());
        assert_eq!(recorder.inbound.lock().len(), 2);
        assert_eq!(*recorder.outbound.lock(), vec![3]);
        assert!(!helper.control());
    }

    #[test]
    fn test_submissions_are_dispatched_by_controller() {
        let config = config();
        let recorder = Arc::new(Recorder::default());
        let helper = ConnectorHelper::new(Side::Server, "async", config.clone(), Arc::clone(&recorder));
        helper.start().unwrap();

        helper.submit_inbound(message(1, &config));
        helper.submit_outbound(message(2, &config));
        wait_for(|| recorder.inbound.lock().len() == 1 && recorder.outbound.lock().len() == 1);

        helper.stop();
    }

    #[test]
    fn test_overload_threshold() {
        let config = ConnectorConfig {
            min_threads: 0,
            max_threads: 10,
            low_threads: 8,
            max_queued: 0,
            ..config()
        };
        let recorder = Arc::new(Recorder::default());
        recorder.blocking.store(true, Ordering::SeqCst);
        let helper = ConnectorHelper::new(Side::Server, "overload", config.clone(), Arc::clone(&recorder));
        helper.start().unwrap();

        for id in 0..7 {
            helper.handle_inbound(message(id, &config), false);
        }
        wait_for(|| helper.worker_pool().is_some_and(|pool| pool.active_count() == 7));
        assert!(!helper.is_worker_service_overloaded());

        helper.handle_inbound(message(7, &config), false);
        wait_for(|| helper.worker_pool().is_some_and(|pool| pool.active_count() == 8));
        assert!(helper.is_worker_service_overloaded());
        // recomputed, not latched
        assert!(helper.is_worker_service_overloaded());

        // the admission gate now drops work
        helper.handle_inbound(message(8, &config), false);
        assert_eq!(*recorder.dropped.lock(), vec![8]);

        recorder.release.store(true, Ordering::SeqCst);
        wait_for(|| recorder.inbound.lock().len() == 8);
        wait_for(|| !helper.is_worker_service_overloaded());

        helper.stop();
    }

    #[test]
    fn test_hand_off_rejection_reaches_handler() {
        let config = ConnectorConfig {
            min_threads: 0,
            max_threads: 2,
            low_threads: 10,
            max_queued: 0,
            ..config()
        };
        let recorder = Arc::new(Recorder::default());
        recorder.blocking.store(true, Ordering::SeqCst);
        let helper = ConnectorHelper::new(Side::Server, "reject", config.clone(), Arc::clone(&recorder));
        helper.start().unwrap();

        helper.handle_inbound(message(0, &config), false);
        helper.handle_inbound(message(1, &config), false);
        wait_for(|| recorder.busy.load(Ordering::SeqCst) == 2);

        helper.handle_inbound(message(2, &config), false);
        assert_eq!(*recorder.dropped.lock(), vec![2]);
        assert_eq!(helper.worker_pool().map(|pool| pool.stats().rejected), Some(1));

        recorder.release.store(true, Ordering::SeqCst);
        helper.stop();
        assert_eq!(recorder.inbound.lock().len(), 2);
    }

    #[test]
    fn test_execute_after_stop_is_dropped() {
        let helper = ConnectorHelper::new(Side::Client, "stopped", config(), Arc::new(Recorder::default()));
        assert!(!helper.execute(|| {}));
    }

    #[test]
    fn test_outbound_error_is_reported_and_requeued() {
        let config = ConnectorConfig {
            worker_threads: false,
            ..config()
        };
        let recorder = Arc::new(Recorder::default());
        let helper = ConnectorHelper::new(Side::Client, "errors", config.clone(), Arc::clone(&recorder));
        let (error_tx, error_rx) = crossbeam_channel::unbounded();

        helper.on_outbound_error(
            StatusCode::SERVICE_UNAVAILABLE,
            message(5, &config).with_error_channel(error_tx),
        );
        assert_eq!(helper.inbound_len(), 1);
        assert_eq!(error_rx.try_recv().unwrap().status, StatusCode::SERVICE_UNAVAILABLE);

        helper.on_inbound_error(StatusCode::BAD_REQUEST, message(6, &config));
        assert_eq!(helper.inbound_len(), 2);

        helper.control();
        assert_eq!(
            *recorder.inbound.lock(),
            vec![
                (5, Some(StatusCode::SERVICE_UNAVAILABLE)),
                (6, Some(StatusCode::BAD_REQUEST)),
            ]
        );
    }
}
