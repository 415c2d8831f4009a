//! Registry actor - owns the set of live connections and processes commands.
//!
//! The RegistryActor is the single owner of connection state in the server.
//! Every read and write of the connection set goes through its command
//! channel, so concurrent connect/disconnect events from different sessions
//! are applied one at a time and snapshots are never torn.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures (caller went away) are ignored

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use pixrate_core::SessionId;

use super::commands::RegistryCommand;
use crate::server::{Connection, ConnectionId};

/// One registered connection.
struct RegistryEntry {
    connection: Arc<Connection>,
    session_id: SessionId,
}

/// The registry actor - owns all connection state.
///
/// Implements the actor pattern: receives commands via mpsc channel and
/// processes them sequentially.
///
/// # Ownership
///
/// The actor owns:
/// - `entries`: registered connections keyed by `ConnectionId`. Ids are
///   allocated monotonically, so iteration order is registration order.
/// - `live_sessions`: session identifiers currently in use, for collision
///   checks when generating new ones.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    entries: BTreeMap<ConnectionId, RegistryEntry>,

    live_sessions: HashSet<SessionId>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            entries: BTreeMap::new(),
            live_sessions: HashSet::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(connections = self.entries.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                connection,
                respond_to,
            } => {
                let session_id = self.handle_register(connection);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(session_id);
            }
            RegistryCommand::Deregister {
                connection_id,
                respond_to,
            } => {
                let released = self.handle_deregister(connection_id);
                if let Some(tx) = respond_to {
                    let _ = tx.send(released);
                }
            }
            RegistryCommand::Snapshot {
                exclude,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_snapshot(exclude));
            }
            RegistryCommand::Size { respond_to } => {
                let _ = respond_to.send(self.entries.len());
            }
            RegistryCommand::SessionOf {
                connection_id,
                respond_to,
            } => {
                let session_id = self
                    .entries
                    .get(&connection_id)
                    .map(|entry| entry.session_id.clone());
                let _ = respond_to.send(session_id);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(&mut self, connection: Arc<Connection>) -> SessionId {
        let connection_id = connection.id();

        if let Some(existing) = self.entries.get(&connection_id) {
            debug!(
                connection = %connection_id,
                session_id = %existing.session_id,
                "Connection already registered"
            );
            return existing.session_id.clone();
        }

        let session_id = self.fresh_session_id();
        self.live_sessions.insert(session_id.clone());
        self.entries.insert(
            connection_id,
            RegistryEntry {
                connection,
                session_id: session_id.clone(),
            },
        );

        debug!(
            connection = %connection_id,
            session_id = %session_id,
            total = self.entries.len(),
            "Connection registered"
        );

        session_id
    }

    /// Generates a session identifier not held by any live session.
    fn fresh_session_id(&self) -> SessionId {
        loop {
            let candidate = SessionId::generate();
            if !self.live_sessions.contains(&candidate) {
                return candidate;
            }
            debug!(session_id = %candidate, "Session id collision, regenerating");
        }
    }

    fn handle_deregister(&mut self, connection_id: ConnectionId) -> Option<SessionId> {
        let entry = self.entries.remove(&connection_id)?;
        self.live_sessions.remove(&entry.session_id);

        debug!(
            connection = %connection_id,
            session_id = %entry.session_id,
            total = self.entries.len(),
            "Connection deregistered"
        );

        Some(entry.session_id)
    }

    fn handle_snapshot(&self, exclude: Option<ConnectionId>) -> Vec<Arc<Connection>> {
        self.entries
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, entry)| Arc::clone(&entry.connection))
            .collect()
    }

    /// Returns the number of registered connections.
    ///
    /// Useful for testing and metrics.
    pub fn connection_count(&self) -> usize {
        self.entries.len()
    }
}
