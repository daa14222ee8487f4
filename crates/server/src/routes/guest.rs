//! Guest bootstrap endpoint.
//!
//! `GET /api/auth/guest?redirectUrl=<url>` acquires a guest identity through
//! the provider's fallback chain and redirects back to the original URL. The
//! gate sends anonymous visitors here; the endpoint itself is never gated.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::auth::guest::{GuestSessionRecord, take_guest_record, write_guest_cookie};
use crate::auth::session_cookie::write_session_cookie;
use crate::identity::GuestSignIn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestQuery {
    pub redirect_url: Option<String>,
}

/// Only same-site relative targets are honored, everything else collapses to
/// `/` (open-redirect guard).
fn sanitize_redirect(target: Option<&str>) -> String {
    match target {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_owned(),
        _ => "/".to_owned(),
    }
}

/// Bootstrap a guest identity and redirect.
///
/// Idempotent for an already-active guest: the existing record is kept and
/// the redirect issued without minting a new identity.
///
/// # Route
///
/// `GET /api/auth/guest`
pub async fn bootstrap_guest(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GuestQuery>,
) -> Response {
    let target = sanitize_redirect(query.redirect_url.as_deref());

    // An active guest cookie wins; do not rotate a live identity.
    let (jar, existing) = take_guest_record(jar);
    if existing.is_some() {
        return (jar, Redirect::temporary(&target)).into_response();
    }

    let secure = state.secure_cookies();
    let outcome = state.provider().sign_in_as_guest().await;

    let jar = match &outcome {
        GuestSignIn::Provider(session) => match write_session_cookie(jar, session, secure) {
            Ok(jar) => jar,
            Err(error) => {
                tracing::error!(%error, "failed to serialize guest provider session");
                return Redirect::temporary(&target).into_response();
            }
        },
        GuestSignIn::PartialProvider(session) | GuestSignIn::LocalOnly(session) => {
            let record = GuestSessionRecord::from_user(&session.user);
            match write_guest_cookie(jar, &record, secure) {
                Ok(jar) => jar,
                Err(error) => {
                    tracing::error!(%error, "failed to serialize guest record");
                    return Redirect::temporary(&target).into_response();
                }
            }
        }
    };

    tracing::info!(
        user_id = %outcome.session().user.id,
        cookie_backed = outcome.is_cookie_backed(),
        "guest identity bootstrapped"
    );

    (jar, Redirect::temporary(&target)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_redirect_accepts_relative_paths() {
        assert_eq!(sanitize_redirect(Some("/chat/abc")), "/chat/abc");
        assert_eq!(sanitize_redirect(Some("/")), "/");
    }

    #[test]
    fn test_sanitize_redirect_rejects_external_targets() {
        assert_eq!(sanitize_redirect(Some("https://evil.invalid")), "/");
        assert_eq!(sanitize_redirect(Some("//evil.invalid/x")), "/");
        assert_eq!(sanitize_redirect(None), "/");
    }
}
