//! Credentialed auth endpoints.
//!
//! JSON API consumed by the login/register pages. Expected failures (bad
//! credentials, duplicate accounts, unverified email) come back as typed
//! action results, never as opaque 500s; only transport-level surprises go
//! through `AppError`.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};

use parlor_core::Email;

use crate::auth::guest::clear_guest_cookie;
use crate::auth::session_cookie::{
    clear_session_cookie, read_session_cookie, write_session_cookie,
};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::identity::IdentityError;
use crate::models::User;
use crate::state::AppState;

/// Minimum accepted password length. Shape-only validation; strength policy
/// is the provider's concern.
const MIN_PASSWORD_LENGTH: usize = 6;

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordUpdate {
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleQuery {
    pub redirect_url: Option<String>,
}

/// Outcome tag for auth actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
    InvalidData,
    UserExists,
    VerificationPending,
}

/// Uniform response body for auth actions.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl ActionResponse {
    fn success(user: User) -> Self {
        Self {
            status: ActionStatus::Success,
            message: None,
            user: Some(user),
        }
    }

    fn status_only(status: ActionStatus, message: &str) -> Self {
        Self {
            status,
            message: Some(message.to_owned()),
            user: None,
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), Response> {
    if Email::parse(email).is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::status_only(
                ActionStatus::InvalidData,
                "Invalid email address",
            )),
        )
            .into_response());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::status_only(
                ActionStatus::InvalidData,
                "Password must be at least 6 characters",
            )),
        )
            .into_response());
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Password sign-in.
///
/// Unverified accounts fail closed: any session the provider issued is
/// revoked before the failure is returned. A verified account without a
/// profile row is treated the same way.
///
/// # Route
///
/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<Credentials>,
) -> Response {
    if let Err(response) = validate_credentials(&payload.email, &payload.password) {
        return response;
    }

    let outcome = match state
        .provider()
        .sign_in(&payload.email, &payload.password)
        .await
    {
        Ok(outcome) => outcome,
        Err(IdentityError::InvalidCredentials) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ActionResponse::status_only(
                    ActionStatus::Failed,
                    "Invalid credentials",
                )),
            )
                .into_response();
        }
        Err(error) => {
            tracing::error!(%error, "sign-in failed upstream");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ActionResponse::status_only(
                    ActionStatus::Failed,
                    "Sign-in is temporarily unavailable",
                )),
            )
                .into_response();
        }
    };

    if !outcome.email_confirmed {
        // Fail closed: the provider may have issued tokens anyway.
        if let Some(session) = &outcome.session
            && let Err(error) = state.provider().sign_out(&session.access_token).await
        {
            tracing::warn!(%error, "failed to revoke unverified session");
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(ActionResponse::status_only(
                ActionStatus::Failed,
                "Please verify your email address before signing in",
            )),
        )
            .into_response();
    }

    let Some(session) = outcome.session else {
        tracing::error!("provider confirmed credentials but withheld session");
        return (
            StatusCode::BAD_GATEWAY,
            Json(ActionResponse::status_only(
                ActionStatus::Failed,
                "Sign-in is temporarily unavailable",
            )),
        )
            .into_response();
    };

    // Verified identity and profile must co-exist.
    match state.profiles().lookup(&session.user.id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(error) = state.provider().sign_out(&session.access_token).await {
                tracing::warn!(%error, "failed to revoke profileless session");
            }
            return (
                StatusCode::UNAUTHORIZED,
                Json(ActionResponse::status_only(
                    ActionStatus::Failed,
                    "Account setup incomplete, please register again",
                )),
            )
                .into_response();
        }
        Err(error) => {
            tracing::error!(%error, "profile lookup failed during sign-in");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ActionResponse::status_only(
                    ActionStatus::Failed,
                    "Sign-in is temporarily unavailable",
                )),
            )
                .into_response();
        }
    }

    // A signed-in account supersedes any lingering guest identity.
    let jar = clear_guest_cookie(jar);
    let jar = match write_session_cookie(jar, &session, state.secure_cookies()) {
        Ok(jar) => jar,
        Err(error) => {
            tracing::error!(%error, "failed to serialize session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    set_sentry_user(&session.user.id, session.user.email.as_deref());
    (jar, Json(ActionResponse::success(session.user))).into_response()
}

/// Account registration.
///
/// # Route
///
/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<Registration>,
) -> Response {
    if let Err(response) = validate_credentials(&payload.email, &payload.password) {
        return response;
    }
    if payload.confirm_password != payload.password {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::status_only(
                ActionStatus::InvalidData,
                "Passwords do not match",
            )),
        )
            .into_response();
    }

    let mut metadata = Map::new();
    if let Some(first_name) = &payload.first_name {
        metadata.insert("first_name".to_owned(), json!(first_name));
    }
    if let Some(last_name) = &payload.last_name {
        metadata.insert("last_name".to_owned(), json!(last_name));
    }
    if let Some(company_name) = &payload.company_name {
        metadata.insert("company_name".to_owned(), json!(company_name));
    }

    let outcome = match state
        .provider()
        .sign_up(&payload.email, &payload.password, metadata)
        .await
    {
        Ok(outcome) => outcome,
        Err(IdentityError::UserAlreadyExists) => {
            return (
                StatusCode::CONFLICT,
                Json(ActionResponse::status_only(
                    ActionStatus::UserExists,
                    "An account with this email already exists",
                )),
            )
                .into_response();
        }
        Err(error) => {
            tracing::error!(%error, "sign-up failed upstream");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ActionResponse::status_only(
                    ActionStatus::Failed,
                    "Registration is temporarily unavailable",
                )),
            )
                .into_response();
        }
    };

    // Confirmation pending: the profile row is created at the callback, not
    // here; an unverified account must not have one.
    let Some(session) = outcome.session else {
        return Json(ActionResponse::status_only(
            ActionStatus::VerificationPending,
            "Check your email to confirm your account",
        ))
        .into_response();
    };

    let jar = clear_guest_cookie(jar);
    let jar = match write_session_cookie(jar, &session, state.secure_cookies()) {
        Ok(jar) => jar,
        Err(error) => {
            tracing::error!(%error, "failed to serialize session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    set_sentry_user(&session.user.id, session.user.email.as_deref());
    (jar, Json(ActionResponse::success(session.user))).into_response()
}

/// Sign out.
///
/// Local state is cleared even when provider revocation fails.
///
/// # Route
///
/// `POST /api/auth/logout`
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(session) = read_session_cookie(&jar)
        && !session.is_synthetic()
        && let Err(error) = state.provider().sign_out(&session.access_token).await
    {
        tracing::debug!(%error, "provider sign-out failed");
    }

    let jar = clear_session_cookie(clear_guest_cookie(jar));
    clear_sentry_user();

    (jar, Json(json!({ "status": "success" }))).into_response()
}

/// Request a password-reset email.
///
/// Always answers success for well-formed input; whether the account exists
/// is not disclosed.
///
/// # Route
///
/// `POST /api/auth/reset-password`
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> Response {
    if Email::parse(&payload.email).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::status_only(
                ActionStatus::InvalidData,
                "Invalid email address",
            )),
        )
            .into_response();
    }

    let redirect_to = format!("{}/auth/callback", state.config().base_url);
    if let Err(error) = state
        .provider()
        .reset_password(&payload.email, &redirect_to)
        .await
    {
        tracing::warn!(%error, "password reset request failed upstream");
    }

    Json(json!({ "status": "success" })).into_response()
}

/// Set a new password for the current provider session.
///
/// # Route
///
/// `POST /api/auth/password`
pub async fn update_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<PasswordUpdate>,
) -> Response {
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::status_only(
                ActionStatus::InvalidData,
                "Password must be at least 6 characters",
            )),
        )
            .into_response();
    }

    let Some(session) = read_session_cookie(&jar) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if session.is_synthetic() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state
        .provider()
        .update_password(&session.access_token, &payload.password)
        .await
    {
        Ok(user) => Json(ActionResponse::success(user)).into_response(),
        Err(IdentityError::SyntheticToken | IdentityError::InvalidCredentials) => {
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(error) => {
            tracing::error!(%error, "password update failed upstream");
            (
                StatusCode::BAD_GATEWAY,
                Json(ActionResponse::status_only(
                    ActionStatus::Failed,
                    "Password update is temporarily unavailable",
                )),
            )
                .into_response()
        }
    }
}

/// Begin the Google OAuth flow.
///
/// Success completes out of band via `/auth/callback`.
///
/// # Route
///
/// `GET /api/auth/google`
pub async fn google(State(state): State<AppState>, Query(query): Query<GoogleQuery>) -> Response {
    let next = match query.redirect_url.as_deref() {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    };
    let callback = format!(
        "{}/auth/callback?next={}",
        state.config().base_url,
        urlencoding::encode(next)
    );

    Redirect::temporary(&state.provider().google_authorize_url(&callback)).into_response()
}
