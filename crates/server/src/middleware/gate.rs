//! Access control gate.
//!
//! Runs once per request, before route handlers. Resolves the request's
//! identity and decides: allow, redirect to guest bootstrap, or redirect away
//! from auth-only pages. The resolved identity is stashed in request
//! extensions for handlers and extractors downstream.
//!
//! Cookie mutations performed during resolution (expired-cookie clearing,
//! session refresh) are propagated by returning the jar with the response;
//! dropping it would silently lose the mutation.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::state::AppState;

/// Liveness path answered directly by the gate, regardless of identity.
const PING_PATH: &str = "/ping";

/// Path prefixes that stay reachable without any identity. Auth endpoints
/// must remain open or nobody could ever acquire an identity.
const BYPASS_PREFIXES: [&str; 2] = ["/api/auth", "/auth/"];

/// Paths that require a resolved identity (guest counts).
fn is_protected(path: &str) -> bool {
    path == "/" || path.starts_with("/chat/") || path == "/chat"
}

/// Auth-only pages that identified users are bounced away from.
fn is_auth_page(path: &str) -> bool {
    path == "/login" || path == "/register"
}

fn is_bypassed(path: &str) -> bool {
    BYPASS_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// The gate middleware.
///
/// Decision table, in order:
/// 1. `/ping` is answered `200 "pong"` without resolution.
/// 2. Auth routes and callbacks pass through unresolved.
/// 3. No identity on a protected path redirects to the guest bootstrap,
///    carrying the original URL.
/// 4. Any identity on `/login` or `/register` redirects to `/`.
/// 5. Otherwise the request proceeds with the identity in its extensions.
pub async fn access_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    if path == PING_PATH {
        return (StatusCode::OK, "pong").into_response();
    }
    if is_bypassed(&path) {
        return next.run(request).await;
    }

    let (jar, identity) = state.resolver().resolve(jar).await;

    if identity.is_anonymous() && is_protected(&path) {
        let original = request
            .uri()
            .path_and_query()
            .map_or_else(|| path.clone(), ToString::to_string);
        let target = format!(
            "/api/auth/guest?redirectUrl={}",
            urlencoding::encode(&original)
        );
        return (jar, Redirect::temporary(&target)).into_response();
    }

    if !identity.is_anonymous() && is_auth_page(&path) {
        return (jar, Redirect::temporary("/")).into_response();
    }

    request.extensions_mut().insert(identity);
    let response = next.run(request).await;
    (jar, response).into_response()
}
