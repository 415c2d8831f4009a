//! Session identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of a generated session identifier.
pub const SESSION_ID_LEN: usize = 8;

/// Identifier assigned to a connection for the lifetime of its session.
///
/// Generated identifiers are short lowercase hex strings
/// (e.g., "3f9a1c07"). They are unique among live sessions but may be
/// reused once the previous holder has disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new SessionId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier of `SESSION_ID_LEN` characters.
    ///
    /// Randomness alone does not guarantee uniqueness; the registry retries
    /// on collision with a live session.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        let short = simple.get(..SESSION_ID_LEN).unwrap_or(&simple);
        Self(short.to_string())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
