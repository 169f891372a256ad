//! HTTP front end
//!
//! Accepts connections on tokio, turns requests into connector messages
//! and waits for their replies. Request handling itself runs on the
//! connector's worker threads.

mod handler;
mod http;

pub use handler::{DirectoryHandler, InFlight};
pub use http::HttpServer;

/// Accept loop polling interval while the connector is overloaded
pub const OVERLOAD_POLL_MS: u64 = 10;

/// Graceful shutdown timeout for open connections
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
