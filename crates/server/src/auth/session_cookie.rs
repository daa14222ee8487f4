//! Provider session cookie codec.
//!
//! Provider-issued sessions (registered accounts and tier-1 anonymous guests)
//! are carried in their own cookie, distinct from the guest cookie. The
//! payload is the full session JSON, percent-encoded; expiry follows the
//! session's own token expiry.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;

use crate::models::Session;

/// Cookie holding the serialized provider session.
pub const SESSION_COOKIE: &str = "identity-session";

/// Read the provider session cookie.
///
/// Returns `None` for a missing cookie or an undecodable payload. Expired
/// sessions are returned as-is; the resolver decides whether to refresh or
/// tear down.
#[must_use]
pub fn read_session_cookie(jar: &CookieJar) -> Option<Session> {
    let raw = jar.get(SESSION_COOKIE)?.value();
    let json = urlencoding::decode(raw).ok()?;
    serde_json::from_str(&json).ok()
}

/// Serialize a session into the jar.
///
/// Cookie lifetime is clamped to the session's remaining token lifetime.
///
/// # Errors
///
/// Returns a serialization error if the session cannot be encoded.
pub fn write_session_cookie(
    jar: CookieJar,
    session: &Session,
    secure: bool,
) -> Result<CookieJar, serde_json::Error> {
    let json = serde_json::to_string(session)?;
    let value = urlencoding::encode(&json).into_owned();

    let remaining = (session.expires_at - Utc::now().timestamp()).max(0);

    let cookie = Cookie::build((SESSION_COOKIE, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(remaining))
        .build();

    Ok(jar.add(cookie))
}

/// Remove the provider session cookie.
#[must_use]
pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    jar.add(cookie)
}
