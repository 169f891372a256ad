//! Directory message handling and reply correlation

use std::fs;
use std::sync::Arc;

use dashmap::DashMap;
use hyper::header::{self, HeaderValue};
use hyper::{HeaderMap, Method, StatusCode};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::connector::{ConnectorHelper, Message, MessageHandler};
use crate::directory::{DirectoryOutcome, DirectoryResource, DirectoryVariant};
use crate::metadata::MediaType;
use crate::negotiation::ClientPreferences;
use crate::{ConnegError, Result};

/// Requests waiting for their reply, by message id
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    waiting: Arc<DashMap<u64, oneshot::Sender<Message>>>,
}

impl InFlight {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; the receiver resolves when its reply is delivered
    /// and fails when the entry is dropped
    pub fn register(&self, id: u64) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(id, tx);
        rx
    }

    /// Deliver a reply to its waiting request
    ///
    /// # Errors
    ///
    /// Returns the message back when no request waits for it
    pub fn complete(&self, message: Message) -> std::result::Result<(), Message> {
        let Some((_, tx)) = self.waiting.remove(&message.id()) else {
            return Err(message);
        };

        if tx.send(message).is_err() {
            debug!("Requester gave up before the reply arrived");
        }
        Ok(())
    }

    /// Forget a request, failing its receiver
    pub fn cancel(&self, id: u64) {
        self.waiting.remove(&id);
    }

    /// Number of requests waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// Whether no request is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Serves directory resources through the connector queues
pub struct DirectoryHandler {
    resource: DirectoryResource,
    in_flight: InFlight,
}

impl DirectoryHandler {
    /// Create a handler replying through `in_flight`
    #[must_use]
    pub fn new(resource: DirectoryResource, in_flight: InFlight) -> Self {
        Self {
            resource,
            in_flight,
        }
    }

    /// Reply table shared with the I/O side
    #[must_use]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Fill in the response of a request message
    pub fn respond(&self, message: &mut Message) {
        let request = message.request().clone();

        if request.method != Method::GET && request.method != Method::HEAD {
            message.set_status(StatusCode::METHOD_NOT_ALLOWED);
            message
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return;
        }

        let preferences = ClientPreferences::from_headers(
            request.header("accept"),
            request.header("accept-language"),
            request.header("accept-charset"),
        );

        let outcome = self
            .resource
            .get(&request.path, request.query.as_deref(), &preferences);

        let result = match outcome {
            Ok(outcome) => self.write_outcome(message, outcome, request.method == Method::HEAD),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!("Unable to serve {}: {}", request.path, e);
            message.headers_mut().clear();
            message.take_outbound();
            message.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    fn write_outcome(&self, message: &mut Message, outcome: DirectoryOutcome, head: bool) -> Result<()> {
        match outcome {
            DirectoryOutcome::Found(variant) => self.write_variant(message, &variant, head)?,
            DirectoryOutcome::MultipleChoices(references) => {
                message.set_status(StatusCode::MULTIPLE_CHOICES);
                write_uri_list(message, &references, head);
            }
            DirectoryOutcome::Listing(references) => {
                message.set_status(StatusCode::OK);
                write_uri_list(message, &references, head);
            }
            DirectoryOutcome::Redirect(location) => {
                message.set_status(StatusCode::SEE_OTHER);
                insert_header(message.headers_mut(), header::LOCATION, &location);
            }
            DirectoryOutcome::NotFound => message.set_status(StatusCode::NOT_FOUND),
            DirectoryOutcome::NotAcceptable => {
                message.set_status(StatusCode::NOT_ACCEPTABLE);
                self.insert_vary(message.headers_mut());
            }
        }
        Ok(())
    }

    fn write_variant(&self, message: &mut Message, found: &DirectoryVariant, head: bool) -> Result<()> {
        let body = fs::read(&found.path)?;
        let variant = &found.variant;

        message.set_status(StatusCode::OK);
        let headers = message.headers_mut();

        if let Some(media_type) = &variant.media_type {
            let media_type = match &variant.character_set {
                Some(charset) => media_type.clone().with_parameter("charset", charset.name()),
                None => media_type.clone(),
            };
            insert_header(headers, header::CONTENT_TYPE, &media_type.to_string());
        }

        if !variant.languages.is_empty() {
            let languages: Vec<String> = variant.languages.iter().map(ToString::to_string).collect();
            insert_header(headers, header::CONTENT_LANGUAGE, &languages.join(", "));
        }

        if let Some(location) = &variant.location {
            insert_header(headers, header::CONTENT_LOCATION, location);
        }

        self.insert_vary(headers);
        insert_header(headers, header::CONTENT_LENGTH, &body.len().to_string());

        if !head {
            message.write_outbound(&body);
        }
        Ok(())
    }

    fn insert_vary(&self, headers: &mut HeaderMap) {
        if self.resource.negotiates() {
            headers.insert(
                header::VARY,
                HeaderValue::from_static("accept, accept-charset, accept-language"),
            );
        }
    }

    fn deliver(&self, message: Message) -> Result<()> {
        self.in_flight
            .complete(message)
            .map_err(|message| ConnegError::UnknownMessage(message.id()))
    }
}

impl MessageHandler for DirectoryHandler {
    fn handle_inbound(&self, helper: &ConnectorHelper<Self>, mut message: Message) {
        // A message that already carries a status is an error delivery
        if message.status().is_some() {
            if let Err(e) = self.deliver(message) {
                debug!("Dropping error delivery: {}", e);
            }
            return;
        }

        self.respond(&mut message);
        helper.submit_outbound(message);
    }

    fn handle_outbound(&self, helper: &ConnectorHelper<Self>, message: Message) {
        if let Err(message) = self.in_flight.complete(message) {
            warn!("{}", ConnegError::UnknownMessage(message.id()));
            helper.on_outbound_error(StatusCode::INTERNAL_SERVER_ERROR, message);
        }
    }

    fn message_dropped(&self, id: u64) {
        debug!("Message {} dropped by the admission gate", id);
        self.in_flight.cancel(id);
    }
}

fn write_uri_list(message: &mut Message, references: &[String], head: bool) {
    let mut body = references.join("\r\n");
    body.push_str("\r\n");

    insert_header(
        message.headers_mut(),
        header::CONTENT_TYPE,
        &MediaType::text_uri_list().to_string(),
    );
    insert_header(message.headers_mut(), header::CONTENT_LENGTH, &body.len().to_string());

    if !head {
        message.write_outbound(body.as_bytes());
    }
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => debug!("Skipping header {} with invalid value {:?}", name, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectorConfig, DirectoryConfig};
    use crate::connector::{RequestHead, Side};
    use crate::negotiation::Negotiator;
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> DirectoryHandler {
        let config = DirectoryConfig::new(dir.path().to_path_buf());
        let resource = DirectoryResource::from_config(&config, Negotiator::default()).unwrap();
        DirectoryHandler::new(resource, InFlight::new())
    }

    fn request(method: Method, path: &str, accept_language: Option<&str>) -> Message {
        let mut head = RequestHead::new(method, path);
        if let Some(value) = accept_language {
            head.headers
                .insert(header::ACCEPT_LANGUAGE, HeaderValue::from_str(value).unwrap());
        }
        Message::new(1, head, &ConnectorConfig::default())
    }

    #[test]
    fn test_respond_with_negotiated_variant() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hello.en.txt"), "hello").unwrap();
        fs::write(dir.path().join("hello.fr.txt"), "bonjour").unwrap();

        let mut message = request(Method::GET, "/hello", Some("fr"));
        handler(&dir).respond(&mut message);

        assert_eq!(message.status(), Some(StatusCode::OK));
        assert_eq!(message.headers()[header::CONTENT_LANGUAGE], "fr");
        assert_eq!(message.headers()[header::CONTENT_TYPE], "text/plain");
        assert!(message.headers().contains_key(header::VARY));
        assert_eq!(&message.take_outbound()[..], b"bonjour");
    }

    #[test]
    fn test_head_has_no_body() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hello.txt"), "hello").unwrap();

        let mut message = request(Method::HEAD, "/hello.txt", None);
        handler(&dir).respond(&mut message);

        assert_eq!(message.status(), Some(StatusCode::OK));
        assert_eq!(message.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(message.outbound_len(), 0);
    }

    #[test]
    fn test_method_not_allowed() {
        let dir = TempDir::new().unwrap();
        let mut message = request(Method::POST, "/hello.txt", None);
        handler(&dir).respond(&mut message);

        assert_eq!(message.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        assert_eq!(message.headers()[header::ALLOW], "GET, HEAD");
    }

    #[test]
    fn test_redirect_and_not_found() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        let handler = handler(&dir);

        let mut message = request(Method::GET, "/docs", None);
        handler.respond(&mut message);
        assert_eq!(message.status(), Some(StatusCode::SEE_OTHER));
        assert_eq!(message.headers()[header::LOCATION], "/docs/");

        let mut message = request(Method::GET, "/missing", None);
        handler.respond(&mut message);
        assert_eq!(message.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_in_flight_correlation() {
        let in_flight = InFlight::new();
        let mut rx = in_flight.register(1);
        assert_eq!(in_flight.len(), 1);

        let reply = Message::new(1, RequestHead::new(Method::GET, "/"), &ConnectorConfig::default());
        assert!(in_flight.complete(reply).is_ok());
        assert!(in_flight.is_empty());
        assert_eq!(rx.try_recv().unwrap().id(), 1);

        let stray = Message::new(2, RequestHead::new(Method::GET, "/"), &ConnectorConfig::default());
        assert_eq!(in_flight.complete(stray).unwrap_err().id(), 2);
    }

    #[test]
    fn test_cancel_fails_receiver() {
        let in_flight = InFlight::new();
        let mut rx = in_flight.register(3);

        in_flight.cancel(3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_reply_is_requeued_as_error() {
        let dir = TempDir::new().unwrap();
        let handler = handler(&dir);
        let in_flight = handler.in_flight().clone();
        let helper = ConnectorHelper::new(Side::Server, "test", ConnectorConfig::default(), handler);

        let mut reply = request(Method::GET, "/", None);
        reply.set_status(StatusCode::OK);
        helper.handle_outbound(reply, true);
        assert_eq!(helper.inbound_len(), 1);

        // a requester arriving late receives the error delivery
        let mut rx = in_flight.register(1);
        assert!(helper.control());

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(helper.inbound_len(), 0);
    }

    #[test]
    fn test_unclaimed_error_delivery_is_dropped() {
        let dir = TempDir::new().unwrap();
        let helper = ConnectorHelper::new(Side::Server, "test", ConnectorConfig::default(), handler(&dir));

        helper.handle_outbound(request(Method::GET, "/", None), true);
        assert_eq!(helper.inbound_len(), 1);

        assert!(helper.control());
        assert_eq!(helper.inbound_len(), 0);
        assert_eq!(helper.outbound_len(), 0);
    }

    #[test]
    fn test_gate_drop_cancels_waiting_request() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let handler = handler(&dir);
        let in_flight = handler.in_flight().clone();
        let config = ConnectorConfig {
            low_threads: 0,
            ..ConnectorConfig::default()
        };
        let helper = ConnectorHelper::new(Side::Server, "test", config, handler);
        helper.start().unwrap();

        let mut rx = in_flight.register(1);
        helper.handle_inbound(request(Method::GET, "/a.txt", None), false);

        assert!(in_flight.is_empty());
        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
        helper.stop();
    }
}
