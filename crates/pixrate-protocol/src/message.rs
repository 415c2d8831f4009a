//! Outbound message types sent from the server to clients.

use chrono::{DateTime, Utc};
use pixrate_core::{RatingAggregate, RatingEntry, RatingSubmission, SessionId};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Message payloads the server sends, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    /// Available images, sent once right after connecting
    FileList {
        /// Image filenames, sorted
        files: Vec<String>,
        /// Session identifier assigned to the receiving connection
        session_id: SessionId,
    },

    /// Direct reply to structured input that is not a rating
    Echo {
        /// The parsed payload as received
        original_message: serde_json::Value,
        /// Sender address (`host:port`)
        client_id: String,
        /// Sender session
        session_id: SessionId,
    },

    /// Acknowledgement of a rating submission
    RatingSaved {
        /// Whether the rating was persisted
        success: bool,
        image_filename: String,
        rating: f64,
        user_name: String,
    },

    /// Error response
    Error {
        /// Error message
        message: String,
    },

    /// Updated aggregate for an image, fanned out after a rating lands
    RatingFeedUpdate {
        image_filename: String,
        total_ratings: usize,
        average_rating: f64,
        /// Newest first
        ratings_feed: Vec<RatingEntry>,
    },

    /// Periodic liveness signal
    Heartbeat {
        /// Number of sessions registered when the heartbeat fired
        connected_clients: usize,
    },
}

/// A timestamped server message, as written on the wire.
///
/// ```json
/// {"timestamp":"2025-01-01T12:00:00Z","type":"heartbeat","connected_clients":3}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// When the message was built
    pub timestamp: DateTime<Utc>,

    /// Message payload
    #[serde(flatten)]
    pub payload: ServerPayload,
}

impl ServerMessage {
    /// Wraps a payload with the current time.
    pub fn new(payload: ServerPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Creates the initial file listing.
    pub fn file_list(files: Vec<String>, session_id: SessionId) -> Self {
        Self::new(ServerPayload::FileList { files, session_id })
    }

    /// Creates an echo of a structured message.
    pub fn echo(original_message: serde_json::Value, client_id: &str, session_id: SessionId) -> Self {
        Self::new(ServerPayload::Echo {
            original_message,
            client_id: client_id.to_string(),
            session_id,
        })
    }

    /// Creates a rating acknowledgement for `submission`.
    pub fn rating_saved(submission: &RatingSubmission, success: bool) -> Self {
        Self::new(ServerPayload::RatingSaved {
            success,
            image_filename: submission.image_filename.clone(),
            rating: submission.rating,
            user_name: submission.user_name.clone(),
        })
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::new(ServerPayload::Error {
            message: message.to_string(),
        })
    }

    /// Creates a feed update from an aggregate.
    pub fn rating_feed_update(aggregate: &RatingAggregate) -> Self {
        Self::new(ServerPayload::RatingFeedUpdate {
            image_filename: aggregate.image_filename.clone(),
            total_ratings: aggregate.total_ratings(),
            average_rating: aggregate.average_rating(),
            ratings_feed: aggregate.ratings_feed.clone(),
        })
    }

    /// Creates a heartbeat.
    pub fn heartbeat(connected_clients: usize) -> Self {
        Self::new(ServerPayload::Heartbeat { connected_clients })
    }

    /// Returns the wire `type` tag of this message.
    pub fn message_type(&self) -> &'static str {
        match self.payload {
            ServerPayload::FileList { .. } => "file_list",
            ServerPayload::Echo { .. } => "echo",
            ServerPayload::RatingSaved { .. } => "rating_saved",
            ServerPayload::Error { .. } => "error",
            ServerPayload::RatingFeedUpdate { .. } => "rating_feed_update",
            ServerPayload::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Serializes the message to a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialize(e.to_string()))
    }
}
