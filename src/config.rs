//! Configuration types for Conneg

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::negotiation::EnrichmentPolicy;
use crate::{ConnegError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Served directory
    pub directory: DirectoryConfig,
    /// Connector parameters
    #[serde(default)]
    pub connector: ConnectorConfig,
    /// Language preference enrichment
    #[serde(default)]
    pub negotiation: EnrichmentPolicy,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8182
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Served directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Root of the served tree
    pub root: PathBuf,
    /// Base name of the index variants of a directory, empty to disable
    #[serde(default = "default_index_name")]
    pub index_name: Option<String>,
    /// Select variants by content negotiation; otherwise list them
    #[serde(default = "default_true")]
    pub negotiate_content: bool,
    /// Return a listing for directories without index
    #[serde(default)]
    pub listing_allowed: bool,
    /// Serve files below the first level of the root
    #[serde(default = "default_true")]
    pub deeply_accessible: bool,
    /// Language assumed by the server when client preferences do not match
    #[serde(default)]
    pub default_language: Option<String>,
}

fn default_index_name() -> Option<String> {
    Some("index".to_string())
}

fn default_true() -> bool {
    true
}

impl DirectoryConfig {
    /// Directory configuration with defaults for the given root
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            index_name: default_index_name(),
            negotiate_content: true,
            listing_allowed: false,
            deeply_accessible: true,
            default_language: None,
        }
    }
}

/// Connector parameters
///
/// Keys follow the connector parameter names (`minThreads`, `maxQueued`,
/// ...) both in TOML and in string parameter maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorConfig {
    /// Core worker threads, pre-started
    pub min_threads: usize,
    /// Maximum worker threads
    pub max_threads: usize,
    /// Active worker count at which the connector is overloaded
    pub low_threads: usize,
    /// 0: hand-off, negative: unbounded queue, N: bounded queue of N
    pub max_queued: i64,
    /// Idle time before a thread above the core count is collected
    pub max_thread_idle_time_ms: u64,
    /// Sleep of the controller thread between two controls
    pub controller_sleep_time_ms: u64,
    /// Maximum wait of an I/O operation, 0 for unlimited
    pub max_io_idle_time_ms: u64,
    /// Dispatch to a worker pool; otherwise handle on the controller thread
    pub worker_threads: bool,
    /// Log every message traversal
    pub tracing: bool,
    /// Request direct buffers (ignored while tracing)
    pub direct_buffers: bool,
    /// Pause between two response writes
    pub throttle_time_ms: u64,
    /// Transport protocol
    pub transport: String,
    /// Capacity of the buffer receiving a message
    pub inbound_buffer_size: usize,
    /// Capacity of the buffer sending a message
    pub outbound_buffer_size: usize,
    /// Detach the controller thread instead of awaiting it on stop
    pub controller_daemon: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            min_threads: 1,
            max_threads: 10,
            low_threads: 8,
            max_queued: 0,
            max_thread_idle_time_ms: 300_000,
            controller_sleep_time_ms: 60_000,
            max_io_idle_time_ms: 60_000,
            worker_threads: true,
            tracing: false,
            direct_buffers: false,
            throttle_time_ms: 0,
            transport: "TCP".to_string(),
            inbound_buffer_size: 16 * 1024,
            outbound_buffer_size: 32 * 1024,
            controller_daemon: false,
        }
    }
}

impl ConnectorConfig {
    /// Read parameters from a string-keyed map; absent keys keep defaults
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed or the result is invalid
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            min_threads: parameter(parameters, "minThreads", defaults.min_threads)?,
            max_threads: parameter(parameters, "maxThreads", defaults.max_threads)?,
            low_threads: parameter(parameters, "lowThreads", defaults.low_threads)?,
            max_queued: parameter(parameters, "maxQueued", defaults.max_queued)?,
            max_thread_idle_time_ms: parameter(
                parameters,
                "maxThreadIdleTimeMs",
                defaults.max_thread_idle_time_ms,
            )?,
            controller_sleep_time_ms: parameter(
                parameters,
                "controllerSleepTimeMs",
                defaults.controller_sleep_time_ms,
            )?,
            max_io_idle_time_ms: parameter(
                parameters,
                "maxIoIdleTimeMs",
                defaults.max_io_idle_time_ms,
            )?,
            worker_threads: parameter(parameters, "workerThreads", defaults.worker_threads)?,
            tracing: parameter(parameters, "tracing", defaults.tracing)?,
            direct_buffers: parameter(parameters, "directBuffers", defaults.direct_buffers)?,
            throttle_time_ms: parameter(parameters, "throttleTimeMs", defaults.throttle_time_ms)?,
            transport: parameter(parameters, "transport", defaults.transport)?,
            inbound_buffer_size: parameter(
                parameters,
                "inboundBufferSize",
                defaults.inbound_buffer_size,
            )?,
            outbound_buffer_size: parameter(
                parameters,
                "outboundBufferSize",
                defaults.outbound_buffer_size,
            )?,
            controller_daemon: parameter(
                parameters,
                "controllerDaemon",
                defaults.controller_daemon,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate connector parameters
    ///
    /// # Errors
    ///
    /// Returns error if thread counts or timings are inconsistent
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(ConnegError::ConfigError(
                "maxThreads must be > 0".to_string(),
            ));
        }

        if self.min_threads > self.max_threads {
            return Err(ConnegError::ConfigError(format!(
                "minThreads ({}) cannot exceed maxThreads ({})",
                self.min_threads, self.max_threads
            )));
        }

        if self.controller_sleep_time_ms == 0 {
            return Err(ConnegError::ConfigError(
                "controllerSleepTimeMs must be > 0".to_string(),
            ));
        }

        if !self.transport.eq_ignore_ascii_case("TCP") {
            return Err(ConnegError::ConfigError(format!(
                "Unsupported transport: {}",
                self.transport
            )));
        }

        Ok(())
    }

    /// Whether direct buffers are effectively used
    #[must_use]
    pub fn is_direct_buffers(&self) -> bool {
        !self.tracing && self.direct_buffers
    }
}

fn parameter<T: FromStr>(parameters: &HashMap<String, String>, name: &str, default: T) -> Result<T> {
    match parameters.get(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConnegError::InvalidParameter {
                name: name.to_string(),
                value: value.clone(),
            }),
    }
}

impl Config {
    /// Configuration serving `directory` with default settings elsewhere
    #[must_use]
    pub fn new(directory: DirectoryConfig) -> Self {
        Self {
            server: ServerConfig::default(),
            directory,
            connector: ConnectorConfig::default(),
            negotiation: EnrichmentPolicy::default(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConnegError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConnegError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if !self.directory.root.is_dir() {
            return Err(ConnegError::ConfigError(format!(
                "Directory root does not exist: {}",
                self.directory.root.display()
            )));
        }

        if let Some(index_name) = &self.directory.index_name {
            if index_name.contains('/') {
                return Err(ConnegError::ConfigError(format!(
                    "Invalid index name: {index_name:?}"
                )));
            }
        }

        if let Some(language) = &self.directory.default_language {
            crate::metadata::Language::parse(language)?;
        }

        if self.server.port == 0 {
            return Err(ConnegError::ConfigError(
                "server port cannot be 0".to_string(),
            ));
        }

        self.connector.validate()
    }
}
