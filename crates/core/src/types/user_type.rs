//! User kind classification.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a user as a durable account or a guest identity.
///
/// This is always derived, never set directly by UI code: a user is a guest
/// iff their metadata carries `user_type: "guest"` or their email local part
/// starts with a guest prefix (see [`crate::is_guest_email`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Anonymous/temporary identity, not backed by a verified account.
    Guest,
    /// Durable, verifiable account.
    #[default]
    Regular,
}

impl UserType {
    /// Returns true for [`UserType::Guest`].
    #[must_use]
    pub const fn is_guest(self) -> bool {
        matches!(self, Self::Guest)
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Regular => write!(f, "regular"),
        }
    }
}
