//! Identity extractors.
//!
//! Handlers behind the gate read the resolved identity from request
//! extensions; these extractors give that a typed, declarative surface.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};

use crate::models::{ResolvedIdentity, Session};

/// Extractor that requires a resolved identity (guest or authenticated).
///
/// # Example
///
/// ```rust,ignore
/// async fn chat_handler(
///     RequireIdentity(session): RequireIdentity,
/// ) -> impl IntoResponse {
///     format!("chatting as {}", session.user.id)
/// }
/// ```
pub struct RequireIdentity(pub Session);

/// Rejection when identity is required but absent.
pub enum IdentityRejection {
    /// Redirect to the guest bootstrap (for page requests).
    RedirectToGuestBootstrap,
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToGuestBootstrap => {
                Redirect::temporary("/api/auth/guest").into_response()
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<ResolvedIdentity>()
            .cloned()
            .unwrap_or(ResolvedIdentity::Anonymous);

        identity.session().cloned().map(Self).ok_or_else(|| {
            if parts.uri.path().starts_with("/api/") {
                IdentityRejection::Unauthorized
            } else {
                IdentityRejection::RedirectToGuestBootstrap
            }
        })
    }
}

/// Extractor that reads the identity without rejecting anonymous requests.
pub struct OptionalIdentity(pub ResolvedIdentity);

impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<ResolvedIdentity>()
            .cloned()
            .unwrap_or(ResolvedIdentity::Anonymous);
        Ok(Self(identity))
    }
}
