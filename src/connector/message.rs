//! Messages exchanged between the I/O layer and request handling

use bytes::{Bytes, BytesMut};
use crossbeam_channel::Sender;
use hyper::{HeaderMap, Method, StatusCode};
use tracing::debug;

use crate::config::ConnectorConfig;

/// Request line and headers of an inbound call
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method
    pub method: Method,
    /// Raw request path, still percent-encoded
    pub path: String,
    /// Raw query string
    pub query: Option<String>,
    /// Request headers
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Create a request head without headers
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
        }
    }

    /// Header value as text, if present and valid
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Failure reported back to whoever issued a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageError {
    /// Message identifier
    pub id: u64,
    /// Status the message failed with
    pub status: StatusCode,
}

/// One call travelling through the connector queues
#[derive(Debug)]
pub struct Message {
    id: u64,
    request: RequestHead,
    status: Option<StatusCode>,
    headers: HeaderMap,
    inbound: BytesMut,
    outbound: BytesMut,
    error_tx: Option<Sender<MessageError>>,
}

impl Message {
    /// Create a message with buffers sized from the connector parameters
    #[must_use]
    pub fn new(id: u64, request: RequestHead, config: &ConnectorConfig) -> Self {
        Self {
            id,
            request,
            status: None,
            headers: HeaderMap::new(),
            inbound: BytesMut::with_capacity(config.inbound_buffer_size),
            outbound: BytesMut::with_capacity(config.outbound_buffer_size),
            error_tx: None,
        }
    }

    /// Attach the channel errors are reported on
    #[must_use]
    pub fn with_error_channel(mut self, error_tx: Sender<MessageError>) -> Self {
        self.error_tx = Some(error_tx);
        self
    }

    /// Correlation identifier
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request line and headers
    #[must_use]
    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    /// Response status, once set
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Set the response status
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body received so far
    #[must_use]
    pub fn inbound_body(&self) -> &[u8] {
        &self.inbound
    }

    /// Append received request bytes
    pub fn read_inbound(&mut self, data: &[u8]) {
        self.inbound.extend_from_slice(data);
    }

    /// Append response bytes
    pub fn write_outbound(&mut self, data: &[u8]) {
        self.outbound.extend_from_slice(data);
    }

    /// Length of the response body written so far
    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Take the response body, leaving an empty buffer
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    /// Notify the error channel, if any
    ///
    /// Returns whether a listener received the error.
    pub fn report_error(&self, status: StatusCode) -> bool {
        let Some(error_tx) = &self.error_tx else {
            return false;
        };

        match error_tx.send(MessageError {
            id: self.id,
            status,
        }) {
            Ok(()) => true,
            Err(_) => {
                debug!("No listener for the error of message {}", self.id);
                false
            }
        }
    }
}
