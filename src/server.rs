//! Ingress server
//!
//! Binds the single ingress port and dispatches everything under the mount
//! prefix to the path router and forwarder. Other paths belong to the
//! inspector and are answered with 404 here.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IngressConfig;
use crate::directory::FunnelDirectory;
use crate::error::{FunnelError, Result};
use crate::notify::NotificationSink;
use crate::proxy::{text_response, Forwarder, ProxyBody};
use crate::router::{RoutedPath, HELLO_BODY};

/// Pause before accepting again after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Single-port HTTP ingress for all funnels
pub struct IngressServer {
    config: IngressConfig,
    forwarder: Arc<Forwarder>,
}

impl IngressServer {
    /// Create a new ingress server
    pub fn new(
        config: IngressConfig,
        directory: Arc<FunnelDirectory>,
        sink: NotificationSink,
    ) -> Self {
        let forwarder =
            Forwarder::new(directory, sink).with_capture_body_limit(config.capture_body_limit);
        Self {
            config,
            forwarder: Arc::new(forwarder),
        }
    }

    pub fn config(&self) -> &IngressConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<FunnelDirectory> {
        self.forwarder.directory()
    }

    /// Check the port is free, then serve in the background
    ///
    /// Port conflicts are reported here rather than from the accept task.
    /// Must be called from within a tokio runtime.
    pub fn start(self: Arc<Self>) -> Result<JoinHandle<()>> {
        let addr = self.config.bind_addr();

        let probe = std::net::TcpListener::bind(&addr).map_err(|source| FunnelError::Listen {
            addr: addr.clone(),
            source,
        })?;
        drop(probe);

        Ok(tokio::spawn(async move {
            if let Err(e) = self.run(&addr).await {
                // nothing can serve funnels without the listener
                error!("Ingress server failed: {}", e);
                std::process::exit(1);
            }
        }))
    }

    /// Bind and accept forever
    async fn run(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| FunnelError::Listen {
                addr: addr.to_string(),
                source,
            })?;
        info!("Ingress listening on {}", addr);

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept error on {}: {}", addr, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let forwarder = self.forwarder.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, remote_addr, forwarder).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(
        stream: TcpStream,
        remote_addr: SocketAddr,
        forwarder: Arc<Forwarder>,
    ) -> std::result::Result<(), hyper::Error> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .preserve_header_case(true)
            .serve_connection(
                io,
                service_fn(move |req| {
                    let forwarder = forwarder.clone();
                    async move { Self::handle_request(req, remote_addr, &forwarder).await }
                }),
            )
            .await
    }

    /// Handle incoming request
    async fn handle_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        forwarder: &Forwarder,
    ) -> std::result::Result<Response<ProxyBody>, Infallible> {
        debug!("{} {} from {}", req.method(), req.uri().path(), remote_addr);

        let routed = match RoutedPath::from_request_path(req.uri().path()) {
            Some(routed) => routed,
            None => return Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
        };

        match Self::process_request(req, routed, remote_addr, forwarder).await {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!("Request from {} failed: {}", remote_addr, e);
                Ok(text_response(e.status_code(), &e.to_string()))
            }
        }
    }

    /// Route and forward one request under the mount prefix
    async fn process_request(
        req: Request<Incoming>,
        routed: Result<RoutedPath>,
        remote_addr: SocketAddr,
        forwarder: &Forwarder,
    ) -> Result<Response<ProxyBody>> {
        let routed = routed?;

        // answered even for unknown funnels: the tunnel may not be registered yet
        if routed.is_hello() {
            return Ok(text_response(StatusCode::OK, HELLO_BODY));
        }

        forwarder.forward(req, &routed, remote_addr).await
    }
}
