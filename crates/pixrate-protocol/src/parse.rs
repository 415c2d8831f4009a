//! Parsing inbound client frames.
//!
//! Clients may send arbitrary text. Anything that parses as JSON is
//! treated as a structured message and dispatched on its `type` field;
//! everything else is plain text.

use chrono::NaiveTime;
use pixrate_core::{DomainResult, RatingSubmission};
use serde_json::Value;

/// `type` tag of a rating submission.
pub const IMAGE_RATING_TYPE: &str = "image_rating";

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Text that is not valid JSON
    Text(String),

    /// A structured message tagged `image_rating`
    ImageRating(RawRatingRequest),

    /// Any other JSON value, including objects with an unknown or
    /// missing `type`
    Structured(Value),
}

impl InboundMessage {
    /// Classifies a raw text frame.
    pub fn parse(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Self::Text(text.to_string()),
        };

        match value.get("type").and_then(Value::as_str) {
            Some(IMAGE_RATING_TYPE) => Self::ImageRating(RawRatingRequest::from_value(&value)),
            _ => Self::Structured(value),
        }
    }
}

/// Rating request fields as sent by the client.
///
/// Every field is optional here; validation happens in
/// [`RawRatingRequest::into_submission`]. Fields of the wrong JSON type
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRatingRequest {
    pub image_filename: Option<String>,
    pub rating: Option<f64>,
    pub comment: Option<String>,
    pub user_name: Option<String>,
}

impl RawRatingRequest {
    /// Extracts rating fields from a JSON object.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            image_filename: text("image_filename"),
            rating: value.get("rating").and_then(Value::as_f64),
            comment: text("comment"),
            user_name: text("user_name"),
        }
    }

    /// Validates the request into a submission.
    pub fn into_submission(self) -> DomainResult<RatingSubmission> {
        RatingSubmission::new(self.image_filename, self.rating, self.comment, self.user_name)
    }
}

/// Formats the reply to a plain-text frame.
///
/// `Echo: <text> (from <client> at <HH:MM:SS>)`
pub fn format_text_echo(text: &str, client: &str, at: NaiveTime) -> String {
    format!("Echo: {text} (from {client} at {})", at.format("%H:%M:%S"))
}
