//! WebSocket listener for bot connections.
//!
//! # Connection Flow
//!
//! 1. Bot opens a TCP connection to the bound address
//! 2. HTTP upgrade request carries `x-self-id: <bot id>`
//! 3. Missing or non-integer id: upgrade rejected with `400 Bad Request`
//! 4. Upgraded stream is split and handed to [`Registry::connect`]
//!
//! # Example
//!
//! ```ignore
//! use botwire::{Handlers, Registry, Server, SessionConfig};
//!
//! let registry = Registry::new(SessionConfig::from_env(), Handlers::new())?;
//! let server = Server::bind("127.0.0.1:8081".parse()?, registry).await?;
//! println!("Listening on {}", server.ws_url());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::BotId;
use crate::session::Registry;

// ============================================================================
// Constants
// ============================================================================

/// Header announcing the connecting bot's identifier.
pub const SELF_ID_HEADER: &str = "x-self-id";

/// Time allowed for the HTTP upgrade after the TCP accept.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Server
// ============================================================================

/// Accepts bot connections and registers them.
pub struct Server {
    /// Bound address.
    local_addr: SocketAddr,
    /// Registry receiving accepted connections.
    registry: Arc<Registry>,
    /// Stops the accept loop.
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Binds `addr` and starts accepting connections into `registry`.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(addr: SocketAddr, registry: Arc<Registry>) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        debug!(%local_addr, "WebSocket server bound");

        tokio::spawn(accept_loop(listener, Arc::clone(&registry), shutdown_rx));

        info!(%local_addr, "Server started");

        Ok(Arc::new(Self {
            local_addr,
            registry,
            shutdown_tx,
        }))
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the registry connections are handed to.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Stops accepting connections and closes every session.
    pub fn shutdown(&self) {
        info!(local_addr = %self.local_addr, "Server shutting down");
        let _ = self.shutdown_tx.send(true);
        self.registry.shutdown();
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

/// Accepts TCP connections until shutdown.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Accept loop started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Accept loop shutting down");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(registry, stream, addr).await {
                            warn!(error = %e, %addr, "Connection handling failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            },
        }
    }

    debug!("Accept loop terminated");
}

/// Upgrades one TCP connection and registers the resulting session.
async fn handle_connection(
    registry: Arc<Registry>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<()> {
    debug!(%addr, "New TCP connection");

    let mut announced = None;
    let callback = |request: &Request, response: Response| -> StdResult<Response, ErrorResponse> {
        match self_id(request) {
            Ok(bot_id) => {
                announced = Some(bot_id);
                Ok(response)
            }
            Err(message) => Err(bad_request(message)),
        }
    };

    let ws_stream = timeout(
        HANDSHAKE_TIMEOUT,
        tokio_tungstenite::accept_hdr_async(stream, callback),
    )
    .await
    .map_err(|_| Error::handshake("upgrade timed out"))?
    .map_err(|e| Error::handshake(format!("WebSocket upgrade failed: {e}")))?;

    let bot_id = announced.ok_or_else(|| Error::handshake("bot id not captured"))?;

    info!(bot_id = %bot_id, %addr, "WebSocket connection established");

    let (writer, reader) = ws_stream.split();
    registry.connect(bot_id, writer, reader);

    Ok(())
}

// ============================================================================
// Handshake
// ============================================================================

/// Reads the bot identifier from the upgrade request.
fn self_id(request: &Request) -> StdResult<BotId, String> {
    let value = request
        .headers()
        .get(SELF_ID_HEADER)
        .ok_or_else(|| format!("missing {SELF_ID_HEADER} header"))?;

    let text = value
        .to_str()
        .map_err(|_| format!("{SELF_ID_HEADER} header is not ASCII"))?;

    text.parse::<BotId>()
        .map_err(|e| format!("invalid {SELF_ID_HEADER} header {text:?}: {e}"))
}

/// Builds a `400 Bad Request` rejection.
fn bad_request(message: String) -> ErrorResponse {
    warn!(reason = %message, "Rejecting upgrade");
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::session::Handlers;

    use std::net::{IpAddr, Ipv4Addr};

    fn upgrade_request(self_id: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(id) = self_id {
            builder = builder.header(SELF_ID_HEADER, id);
        }
        builder.body(()).expect("request")
    }

    async fn bound() -> Arc<Server> {
        let registry = Registry::new(SessionConfig::new(), Handlers::new()).expect("registry");
        Server::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0), registry)
            .await
            .expect("bind should succeed")
    }

    #[test]
    fn test_self_id_parsed() {
        let id = self_id(&upgrade_request(Some(" 10001 "))).expect("valid id");
        assert_eq!(id, BotId::new(10001));
    }

    #[test]
    fn test_self_id_missing_or_invalid() {
        assert!(self_id(&upgrade_request(None)).is_err());
        assert!(self_id(&upgrade_request(Some("bot"))).is_err());
    }

    #[test]
    fn test_bad_request_status() {
        let response = bad_request("missing x-self-id header".to_string());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().as_deref(), Some("missing x-self-id header"));
    }

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = bound().await;

        assert!(server.local_addr().port() > 0);
        assert_eq!(
            server.ws_url(),
            format!("ws://127.0.0.1:{}", server.local_addr().port())
        );
        assert!(server.registry().is_empty());

        server.shutdown();
    }
}
