//! HTTP route surface.

pub mod auth;
pub mod callback;
pub mod guest;
pub mod pages;

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::middleware::access_gate;
use crate::state::AppState;

/// Build the application router with the access gate applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Pages
        .route("/", get(pages::home))
        .route("/chat/{chat_id}", get(pages::chat))
        .route("/login", get(pages::login))
        .route("/register", get(pages::register))
        // Auth API
        .route("/api/auth/guest", get(guest::bootstrap_guest))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/api/auth/password", post(auth::update_password))
        .route("/api/auth/google", get(auth::google))
        // Provider callback
        .route("/auth/callback", get(callback::callback))
        // Ops. The gate answers /ping before the handler runs; the route must
        // still exist or the middleware never sees the request.
        .route("/ping", get(ping))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), access_gate))
        .with_state(state)
}

/// Liveness endpoint; normally answered by the access gate.
async fn ping() -> &'static str {
    "pong"
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::auth::guest::{GUEST_COOKIE, GuestSessionRecord};
    use crate::auth::session_cookie::SESSION_COOKIE;
    use crate::config::{IdentityConfig, ServerConfig};
    use crate::identity::testing::{
        StubProfiles, StubProvider, stub_guest_user, stub_regular_user, stub_session,
    };
    use crate::identity::{AuthOutcome, IdentityError};

    fn test_state(provider: StubProvider, profiles_present: bool) -> AppState {
        test_state_with(Arc::new(provider), profiles_present)
    }

    fn test_state_with(provider: Arc<StubProvider>, profiles_present: bool) -> AppState {
        let config = ServerConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            base_url: "http://localhost:3000".to_owned(),
            identity: IdentityConfig {
                service_url: "https://id.test.invalid".to_owned(),
                anon_key: "anon".to_owned(),
                service_key: secrecy::SecretString::from("kZ8$wQ3!nF6@rT1#vB9&xL4*mH7^cJ2"),
            },
            sentry_dsn: None,
        };
        AppState::new(
            config,
            provider,
            Arc::new(StubProfiles {
                present: profiles_present,
            }),
        )
    }

    fn guest_cookie_header() -> String {
        let record = GuestSessionRecord::from_user(&stub_guest_user("g1"));
        let json = serde_json::to_string(&record).unwrap();
        format!("{GUEST_COOKIE}={}", urlencoding::encode(&json))
    }

    fn session_cookie_header(expires_in: i64) -> String {
        let session = stub_session(stub_regular_user("acct-1"), expires_in);
        let json = serde_json::to_string(&session).unwrap();
        format!("{SESSION_COOKIE}={}", urlencoding::encode(&json))
    }

    async fn send(
        state: AppState,
        uri: &str,
        cookie: Option<&str>,
    ) -> axum::http::Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send_json(
        state: AppState,
        uri: &str,
        body: serde_json::Value,
    ) -> axum::http::Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        router(state).oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_ping_answers_pong_regardless_of_identity() {
        let response = send(test_state(StubProvider::default(), true), "/ping", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn test_anonymous_on_protected_path_redirects_to_guest_bootstrap() {
        let response = send(test_state(StubProvider::default(), true), "/chat/abc", None).await;

        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/api/auth/guest?redirectUrl=%2Fchat%2Fabc"
        );
    }

    #[tokio::test]
    async fn test_guest_on_login_page_redirects_home() {
        let cookie = guest_cookie_header();
        let response = send(test_state(StubProvider::default(), true), "/login", Some(&cookie)).await;

        assert!(response.status().is_redirection());
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_anonymous_on_login_page_passes_through() {
        let response = send(test_state(StubProvider::default(), true), "/login", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_guest_bootstrap_is_never_gated() {
        // Provider fully down: the bootstrap still succeeds via the local
        // tier and redirects with a fresh guest cookie.
        let response = send(
            test_state(StubProvider::default(), true),
            "/api/auth/guest?redirectUrl=%2Fchat%2Fabc",
            None,
        )
        .await;

        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/chat/abc"
        );
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with(GUEST_COOKIE));
    }

    #[tokio::test]
    async fn test_guest_bootstrap_prefers_provider_anonymous_session() {
        let provider = StubProvider::default();
        let user = stub_guest_user("anon-1");
        *provider.anonymous_result.lock().unwrap() = Some(Ok(AuthOutcome {
            user: user.clone(),
            session: Some(stub_session(user, 3600)),
            email_confirmed: false,
        }));

        let response = send(test_state(provider, true), "/api/auth/guest", None).await;

        assert!(response.status().is_redirection());
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        // Tier 1 lands in the provider session cookie, not the guest cookie.
        assert!(set_cookie.starts_with(SESSION_COOKIE));
    }

    #[tokio::test]
    async fn test_guest_cookie_grants_access_to_protected_path() {
        let cookie = guest_cookie_header();
        let response = send(test_state(StubProvider::default(), true), "/", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verified_session_reaches_chat() {
        let provider = StubProvider::default();
        *provider.get_user_result.lock().unwrap() = Some(Ok(AuthOutcome {
            user: stub_regular_user("acct-1"),
            session: None,
            email_confirmed: true,
        }));
        let cookie = session_cookie_header(3600);

        let response = send(test_state(provider, true), "/chat/abc", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unverified_session_is_revoked_and_redirected() {
        let provider = StubProvider::default();
        *provider.get_user_result.lock().unwrap() = Some(Ok(AuthOutcome {
            user: stub_regular_user("acct-1"),
            session: None,
            email_confirmed: false,
        }));
        let cookie = session_cookie_header(3600);

        let response = send(test_state(provider, true), "/chat/abc", Some(&cookie)).await;

        // Torn down to anonymous, so the gate bounces to the bootstrap.
        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/api/auth/guest?redirectUrl=%2Fchat%2Fabc"
        );
    }

    #[tokio::test]
    async fn test_provider_failure_resolves_as_anonymous_not_error() {
        let provider = StubProvider::default();
        *provider.get_user_result.lock().unwrap() =
            Some(Err(IdentityError::InvalidCredentials));
        let cookie = session_cookie_header(3600);

        let response = send(test_state(provider, true), "/chat/abc", Some(&cookie)).await;
        assert!(response.status().is_redirection());
    }

    #[tokio::test]
    async fn test_login_with_unverified_account_fails_and_revokes_session() {
        // The provider may hand out tokens to an unverified account; the
        // login route must refuse the sign-in and revoke what was issued.
        let provider = Arc::new(StubProvider::default());
        let user = stub_regular_user("acct-1");
        *provider.sign_in_result.lock().unwrap() = Some(Ok(AuthOutcome {
            user: user.clone(),
            session: Some(stub_session(user, 3600)),
            email_confirmed: false,
        }));

        let response = send_json(
            test_state_with(Arc::clone(&provider), true),
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": "hunter2x" }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "failed");
        assert_eq!(
            provider.revoked_tokens.lock().unwrap().as_slice(),
            ["stub-access-token"]
        );
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = send(test_state(StubProvider::default(), true), "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
