//! Periodic liveness broadcast.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pixrate_protocol::ServerMessage;

use crate::broadcast::{BroadcastReport, Broadcaster};

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fires one heartbeat.
///
/// Returns `None` without sending anything when no connection is
/// registered.
pub async fn heartbeat_tick(broadcaster: &Broadcaster) -> Option<BroadcastReport> {
    let connected = broadcaster.registry().size().await;
    if connected == 0 {
        return None;
    }

    let report = broadcaster
        .broadcast(&ServerMessage::heartbeat(connected), None)
        .await;
    debug!(connected, delivered = report.delivered, "Heartbeat sent");
    Some(report)
}

/// Spawns the heartbeat task.
///
/// The first heartbeat fires one full `interval` after spawning. The task
/// runs until `cancel` is triggered.
pub fn spawn_heartbeat(
    broadcaster: Broadcaster,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs_f64(), "Heartbeat started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Heartbeat shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    heartbeat_tick(&broadcaster).await;
                }
            }
        }
    })
}
