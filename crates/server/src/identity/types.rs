//! Wire types for the hosted identity provider's REST API, and the
//! normalization routines that turn them into application models.
//!
//! The provider speaks a GoTrue-style dialect: user records carry free-form
//! `user_metadata`, sessions carry bearer tokens plus an expiry. Everything
//! the application consumes goes through [`format_user`] / [`format_session`]
//! so that name assembly and guest classification live in exactly one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use parlor_core::UserId;

use crate::models::{Session, User};

/// Lifetime assumed for sessions whose payload omits both `expires_at` and
/// `expires_in` (the provider's documented default).
const DEFAULT_SESSION_LIFETIME_SECS: i64 = 3600;

// ─────────────────────────────────────────────────────────────────────────────
// Provider Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// A user record as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Set once the user has confirmed their email address.
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl ProviderUser {
    /// Returns true if the provider has recorded email confirmation.
    #[must_use]
    pub const fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// A session payload as returned by token-issuing endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry as epoch seconds. Some endpoints send only `expires_in`.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Response from signup and token-grant endpoints.
///
/// Signup with confirmation enabled returns a user but no session; token
/// grants return both.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<ProviderUser>,
    #[serde(flatten)]
    pub session: Option<ProviderSession>,
}

/// Error body returned by the provider on 4xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default, alias = "error", alias = "msg", alias = "message")]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

/// Fields accepted by the user-update endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty", rename = "data")]
    pub metadata: Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalization
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize a provider user record into the application [`User`] shape.
///
/// Name assembly, in order of preference:
/// 1. explicit `first_name` / `last_name` metadata keys
/// 2. a `display_name`, `full_name`, or `name` key, split on the first space
/// 3. the email local part as display name, with no first/last
#[must_use]
pub fn format_user(provider: &ProviderUser) -> User {
    let meta = &provider.user_metadata;
    let email = provider.email.as_deref();

    let full_name = ["display_name", "full_name", "name"]
        .iter()
        .find_map(|key| meta.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let explicit_first = metadata_str(meta, "first_name");
    let explicit_last = metadata_str(meta, "last_name");

    let (split_first, split_last) = full_name.map_or((None, None), split_name);

    let first_name = explicit_first.or(split_first);
    let last_name = explicit_last.or(split_last);

    let display_name = full_name.map(str::to_owned).or_else(|| {
        match (first_name.as_deref(), last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(only), None) | (None, Some(only)) => Some(only.to_owned()),
            (None, None) => email.map(|e| e.split('@').next().unwrap_or(e).to_owned()),
        }
    });

    let user_type = User::derive_user_type(meta, email);

    User {
        id: UserId::from(provider.id.clone()),
        email: provider.email.clone(),
        display_name,
        first_name,
        last_name,
        company_name: metadata_str(meta, "company_name"),
        avatar_url: metadata_str(meta, "avatar_url"),
        user_type,
        metadata: meta.clone(),
    }
}

/// Normalize a provider session plus its user into the application
/// [`Session`] shape.
///
/// Absolute expiry is taken from `expires_at` when present, otherwise
/// computed from `expires_in`, otherwise defaulted to one hour out.
#[must_use]
pub fn format_session(provider: &ProviderSession, user: User) -> Session {
    let expires_at = provider.expires_at.unwrap_or_else(|| {
        Utc::now().timestamp() + provider.expires_in.unwrap_or(DEFAULT_SESSION_LIFETIME_SECS)
    });

    Session {
        user,
        access_token: provider.access_token.clone(),
        refresh_token: provider.refresh_token.clone(),
        expires_at,
    }
}

/// Synthesize a session for a user the provider could not (or did not) issue
/// tokens for. The token prefix marks the session so it is never presented
/// back to the provider.
#[must_use]
pub fn synthesize_session(user: User, token_prefix: &str, lifetime_secs: i64) -> Session {
    let now = Utc::now().timestamp();
    Session {
        user,
        access_token: format!("{token_prefix}{now}"),
        refresh_token: format!("{token_prefix}refresh_{now}"),
        expires_at: now + lifetime_secs,
    }
}

fn metadata_str(meta: &Map<String, Value>, key: &str) -> Option<String> {
    meta.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Split a full name on the first space into (first, rest).
fn split_name(full: &str) -> (Option<String>, Option<String>) {
    match full.split_once(' ') {
        Some((first, rest)) => (
            Some(first.to_owned()),
            Some(rest.trim().to_owned()).filter(|r| !r.is_empty()),
        ),
        None => (Some(full.to_owned()), None),
    }
}
