//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8765";

/// Default directory of images offered to clients
pub const DEFAULT_PICS_DIR: &str = "pics";

/// Default directory of rating records
pub const DEFAULT_DATA_DIR: &str = "ratings";

/// Outbound frames buffered per connection before broadcasts are dropped
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Largest inbound text frame processed (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Settings for one [`RatingServer`](crate::server::RatingServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub pics_dir: PathBuf,
    pub data_dir: PathBuf,
    pub heartbeat_interval: Duration,
    pub outbound_capacity: usize,
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            pics_dir: PathBuf::from(DEFAULT_PICS_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
