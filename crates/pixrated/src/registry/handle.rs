//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor. `Registration` pairs a register call
//! with exactly one deregister call.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use pixrate_core::SessionId;

use super::commands::{RegistryCommand, RegistryError};
use crate::server::{Connection, ConnectionId};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let session_id = handle.register(Arc::clone(&connection)).await?;
/// let others = handle.snapshot(Some(connection.id())).await;
/// handle.deregister(connection.id()).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Register a connection and return its session identifier.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, connection: Arc<Connection>) -> Result<SessionId, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Register a connection, returning a guard that deregisters it once.
    pub async fn register_scoped(
        &self,
        connection: Arc<Connection>,
    ) -> Result<Registration, RegistryError> {
        let connection_id = connection.id();
        let session_id = self.register(connection).await?;

        Ok(Registration {
            registry: self.clone(),
            connection_id,
            session_id,
            released: false,
        })
    }

    /// Remove a connection.
    ///
    /// Returns the released session identifier, or `None` if the
    /// connection was not registered.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn deregister(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<SessionId>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Deregister {
                connection_id,
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Queue a removal without waiting.
    ///
    /// Usable from synchronous contexts such as `Drop`.
    pub fn deregister_detached(&self, connection_id: ConnectionId) -> Result<(), RegistryError> {
        self.sender
            .try_send(RegistryCommand::Deregister {
                connection_id,
                respond_to: None,
            })
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Copy out the registered connections, optionally leaving one out.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn snapshot(&self, exclude: Option<ConnectionId>) -> Vec<Arc<Connection>> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot {
                exclude,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of registered connections.
    ///
    /// Returns 0 if communication with the actor fails.
    pub async fn size(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Size { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Session identifier of a registered connection.
    pub async fn session_of(&self, connection_id: ConnectionId) -> Option<SessionId> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::SessionOf {
                connection_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

// ============================================================================
// Registration Guard
// ============================================================================

/// A live registration.
///
/// Call [`Registration::release`] when the session ends. If the guard is
/// dropped without being released (the session task was cancelled or
/// panicked), the removal is queued from `Drop` instead. Either way the
/// connection is deregistered exactly once.
pub struct Registration {
    registry: RegistryHandle,
    connection_id: ConnectionId,
    session_id: SessionId,
    released: bool,
}

impl Registration {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Deregisters the connection and waits for the registry to apply it.
    pub async fn release(mut self) -> Result<Option<SessionId>, RegistryError> {
        self.released = true;
        self.registry.deregister(self.connection_id).await
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.registry.deregister_detached(self.connection_id) {
            warn!(
                connection = %self.connection_id,
                session_id = %self.session_id,
                error = %e,
                "Failed to queue deregistration"
            );
        }
    }
}
