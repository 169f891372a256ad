//! Connector backpressure core
//!
//! Decouples connection I/O from request handling: messages wait in
//! inbound/outbound queues, a controller thread drains them, and a bounded
//! worker pool runs the handling. The I/O side polls the overload signal
//! to stop accepting work before the pool is exhausted.

mod controller;
mod helper;
mod message;
mod pool;

use std::time::Duration;

pub use controller::Controller;
pub use helper::{ConnectorHelper, ConnectorState, MessageHandler, Side};
pub use message::{Message, MessageError, RequestHead};
pub use pool::{PoolSettings, PoolStats, QueueDiscipline, RejectionHandler, Task, WorkerPool};

/// Bounded wait for workers to finish on stop
pub const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded wait for the controller to finish on stop
pub const CONTROLLER_STOP_TIMEOUT: Duration = Duration::from_secs(10);
