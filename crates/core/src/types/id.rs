//! Opaque user identifier.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque user identifier.
///
/// Provider-issued IDs are UUIDs; locally synthesized guest identities use
/// `guest_{timestamp}_{random}` strings. The application never inspects the
/// contents - IDs are only compared for equality - so both are carried in the
/// same newtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a `UserId` from an existing opaque string.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// Generate a fresh random (UUID v4) identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the underlying string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the ID and return its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}
