//! HTTP/1 front end

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConnectorConfig};
use crate::connector::{ConnectorHelper, Message, MessageError, RequestHead, Side};
use crate::directory::DirectoryResource;
use crate::negotiation::Negotiator;
use crate::Result;

use super::handler::{DirectoryHandler, InFlight};
use super::{OVERLOAD_POLL_MS, SHUTDOWN_TIMEOUT_MS};

/// HTTP server feeding the connector queues
pub struct HttpServer {
    config: Arc<Config>,
    helper: ConnectorHelper<DirectoryHandler>,
    in_flight: InFlight,
    next_id: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    /// Create a server for a validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if the directory configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        let negotiator = Negotiator::new(config.negotiation);
        let resource = DirectoryResource::from_config(&config.directory, negotiator)?;
        let in_flight = InFlight::new();
        let handler = DirectoryHandler::new(resource, in_flight.clone());
        let helper = ConnectorHelper::new(Side::Server, "http", config.connector.clone(), handler);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(config),
            helper,
            in_flight,
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown_tx,
        })
    }

    /// Sender that triggers a graceful shutdown
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Connector behind the server
    #[must_use]
    pub fn connector(&self) -> &ConnectorHelper<DirectoryHandler> {
        &self.helper
    }

    /// Bind the configured address and serve until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the connector fails
    /// to start
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.bind, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the connector fails to start
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.helper.start()?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {} (root {})", local_addr, self.config.directory.root.display());

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut tasks = JoinSet::new();

        let shutdown_signal = async {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
                _ = shutdown_rx.recv() => info!("Received shutdown signal"),
            }
        };
        tokio::pin!(shutdown_signal);

        loop {
            if self.helper.is_worker_service_overloaded() {
                tokio::select! {
                    () = &mut shutdown_signal => break,
                    () = tokio::time::sleep(Duration::from_millis(OVERLOAD_POLL_MS)) => continue,
                }
            }

            tokio::select! {
                biased;

                () = &mut shutdown_signal => break,

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let exchange = Exchange {
                                config: self.config.connector.clone(),
                                helper: self.helper.clone(),
                                in_flight: self.in_flight.clone(),
                                next_id: Arc::clone(&self.next_id),
                            };
                            tasks.spawn(serve_connection(stream, peer_addr, Arc::new(exchange)));
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        info!("Initiating graceful shutdown");
        drop(listener);

        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        if tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!("Connection task error: {}", e);
                }
            }
        })
        .await
        .is_err()
        {
            debug!("Aborting {} lingering connections", tasks.len());
            tasks.abort_all();
        }

        let helper = self.helper.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || helper.stop()).await {
            warn!("Connector stop failed: {}", e);
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// State shared by every request of the server
struct Exchange {
    config: ConnectorConfig,
    helper: ConnectorHelper<DirectoryHandler>,
    in_flight: InFlight,
    next_id: Arc<AtomicU64>,
}

async fn serve_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, exchange: Arc<Exchange>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request| {
        let exchange = Arc::clone(&exchange);
        async move { Ok::<_, Infallible>(dispatch(&exchange, request).await) }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        debug!("Connection error from {}: {}", peer_addr, e);
    }
}

/// Turn one request into a message, queue it and wait for its reply
async fn dispatch(exchange: &Exchange, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let id = exchange.next_id.fetch_add(1, Ordering::Relaxed);

    let head = RequestHead {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
    };
    let mut message = Message::new(id, head, &exchange.config);

    match read_body(body, exchange.config.inbound_buffer_size).await {
        Ok(bytes) => message.read_inbound(&bytes),
        Err(status) => return status_response(status),
    }

    exchange.exchange(message).await
}

/// Collect a request body of at most `limit` bytes
async fn read_body<B>(body: B, limit: usize) -> std::result::Result<Bytes, StatusCode>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            debug!("Request body exceeds {} bytes", limit);
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

impl Exchange {
    /// Queue a message and turn its reply into a response
    async fn exchange(&self, message: Message) -> Response<Full<Bytes>> {
        let id = message.id();
        let (error_tx, error_rx) = crossbeam_channel::unbounded();
        let message = message.with_error_channel(error_tx);

        let reply = self.in_flight.register(id);
        self.helper.submit_inbound(message);

        let reply = match self.config.max_io_idle_time_ms {
            0 => reply.await.ok(),
            ms => match tokio::time::timeout(Duration::from_millis(ms), reply).await {
                Ok(reply) => reply.ok(),
                Err(_) => {
                    debug!("Message {} timed out", id);
                    self.in_flight.cancel(id);
                    None
                }
            },
        };

        let Some(mut message) = reply else {
            return status_response(failure_status(&error_rx));
        };

        if self.config.throttle_time_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.throttle_time_ms)).await;
        }

        let status = message
            .status()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Full::new(message.take_outbound()));
        *response.status_mut() = status;
        *response.headers_mut() = std::mem::take(message.headers_mut());
        response
    }
}

/// Status for a message that never came back: the last error reported on
/// its channel, else 503
fn failure_status(errors: &Receiver<MessageError>) -> StatusCode {
    errors
        .try_iter()
        .last()
        .map_or(StatusCode::SERVICE_UNAVAILABLE, |error| {
            debug!("Message {} failed with {}", error.id, error.status);
            error.status
        })
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
