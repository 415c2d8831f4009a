//! Fan-out of server messages to registered connections.
//!
//! A broadcast copies the registry's connection set once, serializes the
//! message once, and queues it on every target without waiting. A target
//! whose queue is full or closed is skipped and logged; nothing a single
//! peer does can stall or fail the broadcast as a whole.

use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use pixrate_protocol::ServerMessage;

use crate::registry::RegistryHandle;
use crate::server::{ConnectionError, ConnectionId};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot
    pub targets: usize,
    /// Frames queued successfully
    pub delivered: usize,
    /// Targets that could not be reached
    pub failed: usize,
}

/// Sends messages to every registered connection, or all but one.
#[derive(Clone)]
pub struct Broadcaster {
    registry: RegistryHandle,
}

impl Broadcaster {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Delivers `msg` to every registered connection except `exclude`.
    ///
    /// Best effort: at most one attempt per target, no retry. Connections
    /// registered after the snapshot is taken do not receive the message.
    pub async fn broadcast(&self, msg: &ServerMessage, exclude: Option<ConnectionId>) -> BroadcastReport {
        let targets = self.registry.snapshot(exclude).await;
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let json = match msg.to_json() {
            Ok(j) => j,
            Err(e) => {
                error!(message_type = msg.message_type(), error = %e, "Failed to serialize broadcast");
                return BroadcastReport {
                    targets: targets.len(),
                    delivered: 0,
                    failed: targets.len(),
                };
            }
        };
        let frame = Message::text(json);

        let mut report = BroadcastReport {
            targets: targets.len(),
            ..BroadcastReport::default()
        };

        for conn in &targets {
            match conn.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(ConnectionError::QueueFull) => {
                    report.failed += 1;
                    warn!(
                        connection = %conn.id(),
                        client = %conn.addr(),
                        dropped = conn.drop_count(),
                        message_type = msg.message_type(),
                        "Outbound queue full, dropping broadcast"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    debug!(
                        connection = %conn.id(),
                        client = %conn.addr(),
                        error = %e,
                        message_type = msg.message_type(),
                        "Failed to deliver broadcast"
                    );
                }
            }
        }

        debug!(
            message_type = msg.message_type(),
            targets = report.targets,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::registry::spawn_registry;
    use crate::server::Connection;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn registered(
        broadcaster: &Broadcaster,
        port: u16,
        capacity: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (conn, rx) = Connection::channel(addr(port), capacity);
        broadcaster.registry().register(Arc::clone(&conn)).await.unwrap();
        (conn, rx)
    }

    fn heartbeat_count(frame: Message) -> u64 {
        let value: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        value["connected_clients"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_empty_registry() {
        let broadcaster = Broadcaster::new(spawn_registry());
        let report = broadcaster.broadcast(&ServerMessage::heartbeat(0), None).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let broadcaster = Broadcaster::new(spawn_registry());
        let (_a, mut rx_a) = registered(&broadcaster, 1, 8).await;
        let (_b, mut rx_b) = registered(&broadcaster, 2, 8).await;

        let report = broadcaster.broadcast(&ServerMessage::heartbeat(2), None).await;
        assert_eq!(report.targets, 2);
        assert_eq!(report.delivered, 2);

        assert_eq!(heartbeat_count(rx_a.recv().await.unwrap()), 2);
        assert_eq!(heartbeat_count(rx_b.recv().await.unwrap()), 2);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let broadcaster = Broadcaster::new(spawn_registry());
        let (a, mut rx_a) = registered(&broadcaster, 1, 8).await;
        let (_b, mut rx_b) = registered(&broadcaster, 2, 8).await;
        let (_c, mut rx_c) = registered(&broadcaster, 3, 8).await;

        let report = broadcaster
            .broadcast(&ServerMessage::heartbeat(3), Some(a.id()))
            .await;
        assert_eq!(report.targets, 2);

        assert!(rx_b.recv().await.is_some());
        assert!(rx_c.recv().await.is_some());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_tolerates_dead_and_slow_peers() {
        let broadcaster = Broadcaster::new(spawn_registry());
        let (_dead, rx_dead) = registered(&broadcaster, 1, 8).await;
        let (slow, _rx_slow) = registered(&broadcaster, 2, 1).await;
        let (_ok, mut rx_ok) = registered(&broadcaster, 3, 8).await;

        drop(rx_dead);
        slow.try_send(Message::text("backlog")).unwrap();

        let report = broadcaster.broadcast(&ServerMessage::heartbeat(3), None).await;
        assert_eq!(report.targets, 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);

        assert_eq!(heartbeat_count(rx_ok.recv().await.unwrap()), 3);
    }
}
