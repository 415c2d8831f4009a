//! pixrate Protocol - Wire protocol for WebSocket clients
//!
//! This crate provides the outbound message types and inbound frame
//! parsing shared by the server and its tests.

pub mod message;
pub mod parse;

pub use message::{ServerMessage, ServerPayload};
pub use parse::{format_text_echo, InboundMessage, RawRatingRequest, IMAGE_RATING_TYPE};

/// Errors produced while encoding protocol messages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to serialize message: {0}")]
    Serialize(String),
}
