//! Auth callback: code exchange after email confirmation or OAuth.
//!
//! `GET /auth/callback?code=<code>&next=<path>` exchanges the authorization
//! code for a provider session, ensures the profile row exists, and redirects
//! into the app. All failure paths land on `/login` with an error tag; the
//! callback never renders an error itself.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::auth::session_cookie::write_session_cookie;
use crate::error::set_sentry_user;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
}

/// Handle the provider redirect.
///
/// # Route
///
/// `GET /auth/callback`
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let next = match query.next.as_deref() {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_owned(),
        _ => "/".to_owned(),
    };

    let Some(code) = query.code else {
        tracing::warn!("auth callback missing code");
        return Redirect::temporary("/login?error=missing_code").into_response();
    };

    let session = match state.provider().exchange_code(&code).await {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(%error, "auth code exchange failed");
            return Redirect::temporary("/login?error=auth_code_error").into_response();
        }
    };

    // Verified accounts must have a profile row from this point on; create it
    // here so the resolver's consistency check holds. Guests never get one.
    if !session.user.is_guest()
        && let Err(error) = state.profiles().ensure(&session.user).await
    {
        tracing::error!(%error, user_id = %session.user.id, "profile creation failed");
        return Redirect::temporary("/login?error=profile_setup").into_response();
    }

    let jar = match write_session_cookie(jar, &session, state.secure_cookies()) {
        Ok(jar) => jar,
        Err(error) => {
            tracing::error!(%error, "failed to serialize session after code exchange");
            return Redirect::temporary("/login?error=session").into_response();
        }
    };

    set_sentry_user(&session.user.id, session.user.email.as_deref());
    tracing::info!(user_id = %session.user.id, "auth callback completed");

    (jar, Redirect::temporary(&next)).into_response()
}
