//! Connection registry using Actor pattern.
//!
//! The registry is the central record of every live client connection and
//! the session identifier assigned to it. It receives commands via a tokio
//! mpsc channel, so the actor task is the single point of mutual exclusion
//! for the connection set.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryActor  │◀────│   Broadcaster   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         │                       │                       │
//!         │ Register/Deregister   │ BTreeMap<ConnectionId,│ Snapshot
//!         │ (mpsc channel)        │   RegistryEntry>      │ (copied Vec)
//!         ▼                       ▼                       ▼
//!    one per client         registration order      fan-out targets
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::{Registration, RegistryHandle};

/// Channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use pixrated::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///
///     let connected = handle.size().await;
///     assert_eq!(connected, 0);
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
