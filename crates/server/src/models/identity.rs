//! User, session, and resolved-identity types.
//!
//! These are the application-internal shapes; the identity provider's payloads
//! are normalized into them by the adapter (see `crate::identity::types`).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use parlor_core::{UserId, UserType, is_guest_email};

/// Token prefixes that mark a session as locally synthesized.
///
/// Synthetic tokens are minted when the provider withholds or cannot issue a
/// session (guest fallback tiers 2 and 3, and guest-cookie sessions). They are
/// accepted by the application but must never be presented to the provider as
/// bearer credentials.
pub const SYNTHETIC_TOKEN_PREFIXES: [&str; 2] = ["temp_", "guest_"];

/// An application user.
///
/// Immutable except via the adapter's explicit update operation. `user_type`
/// is always derived from metadata and email, never set directly by UI code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque ID - provider-issued UUID or locally synthesized guest ID.
    pub id: UserId,
    /// Email address, if any. Guest identities carry synthesized addresses.
    pub email: Option<String>,
    /// Display name assembled from first/last name, metadata, or email.
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Derived classification; see [`User::derive_user_type`].
    pub user_type: UserType,
    /// Raw provider metadata, carried through untouched.
    pub metadata: Map<String, Value>,
}

impl User {
    /// Derive the user type from metadata and email.
    ///
    /// A user is a guest iff `metadata.user_type == "guest"` or the email
    /// local part starts with a guest prefix.
    #[must_use]
    pub fn derive_user_type(metadata: &Map<String, Value>, email: Option<&str>) -> UserType {
        let tagged_guest = metadata
            .get("user_type")
            .and_then(Value::as_str)
            .is_some_and(|t| t == "guest");

        if tagged_guest || is_guest_email(email) {
            UserType::Guest
        } else {
            UserType::Regular
        }
    }

    /// Returns true if this is a guest identity.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        self.user_type.is_guest()
    }
}

/// An authenticated or guest session.
///
/// Owned by whichever component last resolved it; persisted only in the
/// cookie or provider store that backs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as epoch seconds.
    pub expires_at: i64,
}

impl Session {
    /// Returns true if this session was synthesized locally and its tokens
    /// are not honored by the provider.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.user.is_guest()
            || SYNTHETIC_TOKEN_PREFIXES
                .iter()
                .any(|prefix| self.access_token.starts_with(prefix))
    }

    /// Returns true if the session's access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

/// The single authoritative identity state for a request or mount.
///
/// Exactly one variant holds for any resolution; the enum makes the
/// invariant structural.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedIdentity {
    /// A verified, profile-backed account session.
    Authenticated(Session),
    /// A guest session (provider-anonymous or locally synthesized).
    Guest(Session),
    /// No identity; the gate decides whether to bootstrap a guest.
    Anonymous,
}

impl ResolvedIdentity {
    /// The session, if any identity is present.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) | Self::Guest(session) => Some(session),
            Self::Anonymous => None,
        }
    }

    /// The user, if any identity is present.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self.session() {
            Some(session) => Some(&session.user),
            None => None,
        }
    }

    /// Returns true if no identity was resolved.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns true for a guest identity.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest(_))
    }
}
