//! Server-side handle for one client connection.
//!
//! A `Connection` owns the sending half of a bounded queue that a
//! per-connection writer task drains into the WebSocket. Sessions write
//! through it with backpressure (`send`), broadcasts write through it
//! without ever waiting (`try_send`).
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Queue closure and saturation surface as `ConnectionError`

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use pixrate_protocol::ServerMessage;

/// Write timeout for direct replies and socket writes (10 seconds)
pub(super) const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of connection identities. Never reset, so ids are never reused.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one accepted connection.
///
/// Two connections from the same address still get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identity.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connected client.
pub struct Connection {
    id: ConnectionId,

    /// Remote address of the peer
    addr: SocketAddr,

    /// Outbound queue drained by the connection's writer task
    tx: mpsc::Sender<Message>,

    /// Frames dropped because the queue was full or closed
    dropped: AtomicU64,
}

impl Connection {
    /// Creates a connection that writes into `tx`.
    pub fn new(addr: SocketAddr, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            addr,
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Creates a connection together with the receiving end of its queue.
    pub fn channel(addr: SocketAddr, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(addr, tx)), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serializes and sends a message, waiting for queue space.
    pub async fn send(&self, msg: &ServerMessage) -> Result<(), ConnectionError> {
        let json = msg
            .to_json()
            .map_err(|e| ConnectionError::Serialize(e.to_string()))?;
        self.send_frame(Message::text(json)).await
    }

    /// Sends a raw text frame, waiting for queue space.
    pub async fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        self.send_frame(Message::text(text)).await
    }

    async fn send_frame(&self, frame: Message) -> Result<(), ConnectionError> {
        match timeout(WRITE_TIMEOUT, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Queues a frame without waiting.
    ///
    /// Fails immediately if the peer is gone or its queue is full.
    pub fn try_send(&self, frame: Message) -> Result<(), ConnectionError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match e {
                    TrySendError::Full(_) => Err(ConnectionError::QueueFull),
                    TrySendError::Closed(_) => Err(ConnectionError::Closed),
                }
            }
        }
    }

    /// Asks the writer task to send a close frame.
    pub fn close(&self) {
        let _ = self.tx.try_send(Message::Close(None));
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total frames dropped by `try_send`.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Outbound queue full")]
    QueueFull,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Registry error: {0}")]
    Registry(String),
}
