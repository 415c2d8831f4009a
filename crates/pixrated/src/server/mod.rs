//! WebSocket server for rating clients.
//!
//! The server:
//! - Listens on a TCP socket and upgrades each connection to WebSocket
//! - Spawns a SessionHandler and a frame writer for each client
//! - Runs the heartbeat alongside the accept loop
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  RatingServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept() + upgrade
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ Connection (bounded queue)
//!         ▼
//! ┌─────────────────┐
//! │  frame writer   │──▶ WebSocket sink
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Per-connection errors are logged and allow continued operation

mod connection;
mod session;

pub use connection::{Connection, ConnectionError, ConnectionId};

use connection::WRITE_TIMEOUT;
pub use session::{SessionContext, SessionHandler, SessionState};

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broadcast::Broadcaster;
use crate::catalog::ImageCatalog;
use crate::config::ServerConfig;
use crate::heartbeat::spawn_heartbeat;
use crate::registry::RegistryHandle;
use crate::store::RatingStore;

/// WebSocket server for rating clients.
pub struct RatingServer {
    config: ServerConfig,

    /// Handle to the connection registry
    registry: RegistryHandle,

    broadcaster: Broadcaster,
    store: Arc<dyn RatingStore>,
    catalog: Arc<ImageCatalog>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl RatingServer {
    /// Creates a new server.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen address, directories and limits
    /// * `registry` - Handle to the connection registry
    /// * `store` - Where ratings are persisted
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        config: ServerConfig,
        registry: RegistryHandle,
        store: Arc<dyn RatingStore>,
        cancel_token: CancellationToken,
    ) -> Self {
        let catalog = Arc::new(ImageCatalog::new(config.pics_dir.clone()));
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            config,
            registry,
            store,
            catalog,
            cancel_token,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.config.bind_addr,
                error: e.to_string(),
            })
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections from an already bound listener until shutdown.
    ///
    /// Returns an error if the heartbeat task ends on its own or the
    /// listener fails with a non-transient error.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Rating server listening"),
            Err(e) => debug!(error = %e, "Listening on unknown address"),
        }

        let heartbeat = spawn_heartbeat(
            self.broadcaster.clone(),
            self.config.heartbeat_interval,
            self.cancel_token.child_token(),
        );

        self.accept_loop(listener, heartbeat).await
    }

    /// Accept loop supervising the heartbeat task.
    async fn accept_loop(
        &self,
        listener: TcpListener,
        mut heartbeat: JoinHandle<()>,
    ) -> Result<(), ServerError> {
        let mut heartbeat_done = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = &mut heartbeat => {
                    heartbeat_done = true;
                    if self.cancel_token.is_cancelled() {
                        break;
                    }
                    let reason = match result {
                        Ok(()) => "exited unexpectedly".to_string(),
                        Err(e) => e.to_string(),
                    };
                    error!(reason = %reason, "Heartbeat task stopped");
                    return Err(ServerError::Heartbeat(reason));
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr),
                        Err(e) if is_transient_accept_error(&e) => {
                            debug!(error = %e, "Transient accept error");
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            heartbeat.abort();
                            return Err(ServerError::Accept(e.to_string()));
                        }
                    }
                }
            }
        }

        if !heartbeat_done {
            if let Err(e) = heartbeat.await {
                debug!(error = %e, "Heartbeat task ended abnormally");
            }
        }

        info!("Server stopped");
        Ok(())
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: self.registry.clone(),
            broadcaster: self.broadcaster.clone(),
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            max_message_size: self.config.max_message_size,
        }
    }

    /// Upgrades a new client connection and spawns its session.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.session_context();
        let capacity = self.config.outbound_capacity;

        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!(client = %addr, error = %e, "WebSocket handshake failed");
                    return;
                }
            };

            let (sink, inbound) = ws.split();
            let (connection, outbound) = Connection::channel(addr, capacity);
            let writer = tokio::spawn(write_frames(sink, outbound, connection.id()));

            SessionHandler::new(connection, ctx).run(inbound).await;

            if let Err(e) = writer.await {
                debug!(client = %addr, error = %e, "Writer task ended abnormally");
            }
        });
    }
}

/// Accept errors caused by a single peer rather than the listener.
fn is_transient_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

/// Drains a connection's outbound queue into its WebSocket sink.
///
/// Stops after sending a close frame, when every sender is gone, on the
/// first write error, or when a write does not complete within
/// `WRITE_TIMEOUT` (the peer stopped reading).
async fn write_frames<S>(mut sink: S, mut outbound: mpsc::Receiver<Message>, connection: ConnectionId)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, Message::Close(_));
        match timeout(WRITE_TIMEOUT, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection = %connection, error = %e, "Write failed");
                break;
            }
            Err(_) => {
                debug!(connection = %connection, "Write timed out, dropping peer");
                // Abandon the stalled socket without a close handshake
                return;
            }
        }
        if closing {
            break;
        }
    }

    if timeout(WRITE_TIMEOUT, sink.close()).await.is_err() {
        debug!(connection = %connection, "Close timed out");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Accept loop failed: {0}")]
    Accept(String),

    #[error("Heartbeat task stopped: {0}")]
    Heartbeat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::WebSocketStream;

    use crate::registry::spawn_registry;
    use crate::store::MemoryRatingStore;

    fn test_server(cancel_token: CancellationToken) -> RatingServer {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            pics_dir: std::env::temp_dir().join("pixrate-server-tests-no-pics"),
            ..ServerConfig::default()
        };
        RatingServer::new(
            config,
            spawn_registry(),
            Arc::new(MemoryRatingStore::new()),
            cancel_token,
        )
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:8765"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_write_frames_stops_after_close() {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let mut client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(Message::text("one")).await.unwrap();
        tx.send(Message::Close(None)).await.unwrap();
        tx.send(Message::text("after close")).await.unwrap();

        let (sink, _inbound) = server_ws.split();
        write_frames(sink, rx, ConnectionId::next()).await;

        let first = client_ws.next().await.unwrap().unwrap();
        assert_eq!(first, Message::text("one"));
        let second = client_ws.next().await.unwrap().unwrap();
        assert!(matches!(second, Message::Close(_)));
    }

    #[tokio::test]
    async fn test_write_frames_gives_up_on_stalled_peer() {
        tokio::time::pause();

        // Tiny pipe the client never reads from
        let (server_io, client_io) = tokio::io::duplex(64);
        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let _client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(Message::text("x".repeat(16 * 1024))).await.unwrap();
        tx.send(Message::text("y".repeat(16 * 1024))).await.unwrap();

        let (sink, _inbound) = server_ws.split();
        let writer = tokio::spawn(write_frames(sink, rx, ConnectionId::next()));

        let finished = tokio::time::timeout(WRITE_TIMEOUT * 3, writer).await;
        assert!(finished.is_ok(), "writer must give up on a peer that stopped reading");
        drop(tx);
    }

    #[tokio::test]
    async fn test_server_stops_when_heartbeat_exits() {
        let server = test_server(CancellationToken::new());
        let listener = server.bind().await.unwrap();

        let heartbeat = tokio::spawn(async {});
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.accept_loop(listener, heartbeat),
        )
        .await
        .expect("accept loop returns");

        assert!(matches!(result, Err(ServerError::Heartbeat(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_server_stops_when_heartbeat_panics() {
        let server = test_server(CancellationToken::new());
        let listener = server.bind().await.unwrap();

        let heartbeat = tokio::spawn(async { panic!("heartbeat failure") });
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.accept_loop(listener, heartbeat),
        )
        .await
        .expect("accept loop returns");

        assert!(matches!(result, Err(ServerError::Heartbeat(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_cancelled_server_stops_cleanly() {
        let cancel_token = CancellationToken::new();
        let server = test_server(cancel_token.clone());
        let listener = server.bind().await.unwrap();

        cancel_token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server.serve(listener))
            .await
            .expect("serve returns after cancel");
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn test_transient_accept_errors() {
        use std::io::Error;

        assert!(is_transient_accept_error(&Error::from(ErrorKind::ConnectionAborted)));
        assert!(is_transient_accept_error(&Error::from(ErrorKind::Interrupted)));
        assert!(!is_transient_accept_error(&Error::from(ErrorKind::PermissionDenied)));
    }
}
