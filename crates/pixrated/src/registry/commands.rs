//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::sync::Arc;

use pixrate_core::SessionId;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::server::{Connection, ConnectionId};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
///
/// # Usage
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(RegistryCommand::Size { respond_to: tx }).await?;
/// let connected = rx.await?;
/// ```
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a connection and assign it a session identifier.
    ///
    /// Registering a connection that is already present returns its
    /// existing session identifier.
    Register {
        /// The connection to register
        connection: Arc<Connection>,
        /// Channel to send the assigned session identifier
        respond_to: oneshot::Sender<SessionId>,
    },

    /// Remove a connection.
    ///
    /// Absent connections are a no-op. The response carries the session
    /// identifier that was released, if any. `respond_to` is `None` for
    /// fire-and-forget removal.
    Deregister {
        /// ID of the connection to remove
        connection_id: ConnectionId,
        /// Channel to send the result
        respond_to: Option<oneshot::Sender<Option<SessionId>>>,
    },

    /// Copy out the registered connections in registration order.
    Snapshot {
        /// Connection to leave out of the copy
        exclude: Option<ConnectionId>,
        /// Channel to send the copy
        respond_to: oneshot::Sender<Vec<Arc<Connection>>>,
    },

    /// Number of registered connections.
    Size {
        /// Channel to send the count
        respond_to: oneshot::Sender<usize>,
    },

    /// Look up the session identifier of a connection.
    SessionOf {
        /// ID of the connection
        connection_id: ConnectionId,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<SessionId>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// The command or response channel was closed.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}
