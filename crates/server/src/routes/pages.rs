//! Minimal page handlers.
//!
//! The chat UI itself lives elsewhere; these handlers exist so the gated
//! route surface is real and the identity plumbing is exercised end to end.

use axum::{
    extract::Path,
    response::{Html, IntoResponse},
};

use crate::middleware::{OptionalIdentity, RequireIdentity};

/// `GET /`
pub async fn home(OptionalIdentity(identity): OptionalIdentity) -> impl IntoResponse {
    let greeting = identity
        .user()
        .and_then(|user| user.display_name.clone())
        .unwrap_or_else(|| "there".to_owned());
    Html(format!("<h1>Parlor</h1><p>Hello, {greeting}.</p>"))
}

/// `GET /chat/{id}`
pub async fn chat(
    Path(chat_id): Path<String>,
    RequireIdentity(session): RequireIdentity,
) -> impl IntoResponse {
    Html(format!(
        "<h1>Chat {chat_id}</h1><p>Connected as {}.</p>",
        session.user.id
    ))
}

/// `GET /login`
pub async fn login() -> impl IntoResponse {
    Html("<h1>Sign in</h1>")
}

/// `GET /register`
pub async fn register() -> impl IntoResponse {
    Html("<h1>Create account</h1>")
}
