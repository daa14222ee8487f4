//! Guest session cookie codec.
//!
//! Guest identities that the provider cannot persist (fallback tiers 2 and 3)
//! live entirely in a browser cookie. The payload is a flat identity record,
//! JSON-encoded then percent-encoded for cookie-value safety. Expiry is lazy:
//! reads check the recorded creation time rather than trusting the browser to
//! drop the cookie, and the first read past expiry clears it.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};

use parlor_core::{UserId, UserType};

use crate::models::{Session, User};

/// Cookie holding the serialized guest record.
pub const GUEST_COOKIE: &str = "guest-session";

/// Guest records expire 24 hours after creation.
pub const GUEST_SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// The guest cookie payload.
///
/// Record IDs are minted once per anonymous visit and never reused after
/// expiry; a fresh visit gets a fresh record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSessionRecord {
    pub id: UserId,
    pub email: String,
    pub user_type: UserType,
    pub display_name: String,
    pub is_temporary: bool,
    pub created_at: DateTime<Utc>,
}

impl GuestSessionRecord {
    /// Capture a guest user into a cookie record.
    #[must_use]
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            user_type: UserType::Guest,
            display_name: user
                .display_name
                .clone()
                .unwrap_or_else(|| "Guest".to_owned()),
            is_temporary: true,
            created_at: Utc::now(),
        }
    }

    /// Returns true once more than 24 hours have passed since creation.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() > GUEST_SESSION_MAX_AGE_SECS
    }

    /// Rehydrate the record into a synthetic guest session.
    ///
    /// Token and expiry are derived from the record, so repeated resolution
    /// of an unchanged cookie yields an identical session.
    #[must_use]
    pub fn to_session(&self) -> Session {
        let created = self.created_at.timestamp();
        let mut metadata = Map::new();
        metadata.insert("user_type".to_owned(), json!("guest"));

        let user = User {
            id: self.id.clone(),
            email: Some(self.email.clone()).filter(|e| !e.is_empty()),
            display_name: Some(self.display_name.clone()),
            first_name: None,
            last_name: None,
            company_name: None,
            avatar_url: None,
            user_type: UserType::Guest,
            metadata,
        };

        Session {
            user,
            access_token: format!("guest_{created}"),
            refresh_token: format!("guest_refresh_{created}"),
            expires_at: created + GUEST_SESSION_MAX_AGE_SECS,
        }
    }
}

/// Read the guest cookie, clearing it when expired or undecodable.
///
/// Returns the possibly-mutated jar alongside the record. Malformed payloads
/// are treated identically to "no guest session".
#[must_use]
pub fn take_guest_record(jar: CookieJar) -> (CookieJar, Option<GuestSessionRecord>) {
    let Some(raw) = jar.get(GUEST_COOKIE).map(|c| c.value().to_owned()) else {
        return (jar, None);
    };

    let record = urlencoding::decode(&raw)
        .ok()
        .and_then(|json| serde_json::from_str::<GuestSessionRecord>(&json).ok());

    match record {
        Some(record) if !record.is_expired(Utc::now()) => (jar, Some(record)),
        // Expired or garbage: drop the cookie so the next visit starts clean.
        _ => (clear_guest_cookie(jar), None),
    }
}

/// Serialize a guest record into the jar.
///
/// # Errors
///
/// Returns a serialization error if the record cannot be encoded; record
/// fields serialize infallibly in practice.
pub fn write_guest_cookie(
    jar: CookieJar,
    record: &GuestSessionRecord,
    secure: bool,
) -> Result<CookieJar, serde_json::Error> {
    let json = serde_json::to_string(record)?;
    let value = urlencoding::encode(&json).into_owned();

    let cookie = Cookie::build((GUEST_COOKIE, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(GUEST_SESSION_MAX_AGE_SECS))
        .build();

    Ok(jar.add(cookie))
}

/// Remove the guest cookie.
#[must_use]
pub fn clear_guest_cookie(jar: CookieJar) -> CookieJar {
    let cookie = Cookie::build((GUEST_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    jar.add(cookie)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn guest_user() -> User {
        let mut metadata = Map::new();
        metadata.insert("user_type".to_owned(), json!("guest"));
        User {
            id: UserId::random(),
            email: Some("guest_1700_ab@example.com".to_owned()),
            display_name: Some("Guest".to_owned()),
            first_name: None,
            last_name: None,
            company_name: None,
            avatar_url: None,
            user_type: UserType::Guest,
            metadata,
        }
    }

    #[test]
    fn test_round_trip_through_jar() {
        let record = GuestSessionRecord::from_user(&guest_user());
        let jar = write_guest_cookie(CookieJar::new(), &record, false).unwrap();

        let (_, read) = take_guest_record(jar);
        assert_eq!(read.unwrap(), record);
    }

    #[test]
    fn test_expiry_boundaries() {
        let now = Utc::now();
        let mut record = GuestSessionRecord::from_user(&guest_user());

        // 23h59m old: still valid.
        record.created_at = now - Duration::seconds(GUEST_SESSION_MAX_AGE_SECS - 60);
        assert!(!record.is_expired(now));

        // Exactly 24h: still valid (strictly greater-than).
        record.created_at = now - Duration::seconds(GUEST_SESSION_MAX_AGE_SECS);
        assert!(!record.is_expired(now));

        // 24h + 1s: expired.
        record.created_at = now - Duration::seconds(GUEST_SESSION_MAX_AGE_SECS + 1);
        assert!(record.is_expired(now));
    }

    #[test]
    fn test_expired_record_is_cleared_on_read() {
        let mut record = GuestSessionRecord::from_user(&guest_user());
        record.created_at = Utc::now() - Duration::seconds(GUEST_SESSION_MAX_AGE_SECS + 60);
        let jar = write_guest_cookie(CookieJar::new(), &record, false).unwrap();

        let (jar, read) = take_guest_record(jar);
        assert!(read.is_none());
        // Removal is expressed as an empty, immediately expiring cookie.
        let cleared = jar.get(GUEST_COOKIE).unwrap();
        assert!(cleared.value().is_empty());
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn test_garbage_cookie_is_cleared_on_read() {
        let jar = CookieJar::new().add(Cookie::new(GUEST_COOKIE, "not%20json"));
        let (jar, read) = take_guest_record(jar);

        assert!(read.is_none());
        assert!(jar.get(GUEST_COOKIE).unwrap().value().is_empty());
    }

    #[test]
    fn test_missing_cookie_is_untouched() {
        let (jar, read) = take_guest_record(CookieJar::new());
        assert!(read.is_none());
        assert!(jar.get(GUEST_COOKIE).is_none());
    }

    #[test]
    fn test_rehydrated_session_is_stable_and_synthetic() {
        let record = GuestSessionRecord::from_user(&guest_user());
        let first = record.to_session();
        let second = record.to_session();

        assert_eq!(first, second);
        assert!(first.is_synthetic());
        assert!(first.user.is_guest());
        assert_eq!(
            first.expires_at,
            record.created_at.timestamp() + GUEST_SESSION_MAX_AGE_SECS
        );
    }

    #[test]
    fn test_cookie_attributes() {
        let record = GuestSessionRecord::from_user(&guest_user());
        let jar = write_guest_cookie(CookieJar::new(), &record, true).unwrap();
        let cookie = jar.get(GUEST_COOKIE).unwrap();

        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
