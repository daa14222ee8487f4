//! Identity provider adapter.
//!
//! The application never talks to the hosted identity service directly;
//! everything goes through the [`IdentityProvider`] trait so that handlers and
//! middleware can be exercised against a scripted implementation. The
//! production implementation, [`HttpIdentityClient`], speaks the provider's
//! GoTrue-style REST dialect.
//!
//! # Guest Fallback
//!
//! [`IdentityProvider::sign_in_as_guest`] degrades through three tiers:
//!
//! 1. Anonymous sign-in at the provider. Yields a real provider session.
//! 2. Signup of a synthesized guest account. Yields a provider-issued session
//!    when the provider returns one, otherwise a locally synthesized session
//!    around the provider-created user.
//! 3. A fully local guest identity with synthesized tokens, when the provider
//!    is unreachable or rejects both attempts.
//!
//! The caller learns which tier applied from the [`GuestSignIn`] tag and
//! chooses the persistence mechanism accordingly.

pub mod profiles;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use types::{
    AuthResponse, ProviderSession, ProviderUser, UserUpdate, format_session, format_user,
    synthesize_session,
};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::broadcast;

use parlor_core::{UserId, UserType};

use crate::config::IdentityConfig;
use crate::models::identity::SYNTHETIC_TOKEN_PREFIXES;
use crate::models::{Session, User};

use types::ProviderErrorBody;

/// Token lifetime for locally synthesized sessions (one hour). The guest
/// cookie carrying the identity outlives the token; only the cookie's expiry
/// matters for guests.
pub const SYNTHETIC_SESSION_LIFETIME_SECS: i64 = 3600;

/// Broadcast channel capacity for auth events.
const EVENT_CHANNEL_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the identity provider adapter.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    UserAlreadyExists,

    #[error("anonymous sign-in is disabled at the provider")]
    AnonymousSignInDisabled,

    #[error("session token was synthesized locally and is not valid at the provider")]
    SyntheticToken,

    #[error("provider returned no session in response")]
    MissingSession,

    #[error("provider returned no user in response")]
    MissingUser,

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("identity service request failed: {0}")]
    Http(#[from] reqwest::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes and Events
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a credentialed auth operation.
///
/// `session` is absent when the provider withholds tokens, e.g. signup with
/// email confirmation pending. `email_confirmed` reflects the provider's
/// record at the time of the call.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub session: Option<Session>,
    pub email_confirmed: bool,
}

/// Result of the guest sign-in fallback, tagged by the tier that produced it.
#[derive(Debug, Clone)]
pub enum GuestSignIn {
    /// Provider-issued session (anonymous sign-in, or guest signup that
    /// returned tokens). Persisted like any other provider session.
    Provider(Session),
    /// Provider-created guest account without provider tokens; the session is
    /// synthesized locally. Persisted in the guest cookie.
    PartialProvider(Session),
    /// Fully local guest identity; the provider knows nothing about it.
    /// Persisted in the guest cookie.
    LocalOnly(Session),
}

impl GuestSignIn {
    /// The session, regardless of tier.
    #[must_use]
    pub const fn session(&self) -> &Session {
        match self {
            Self::Provider(s) | Self::PartialProvider(s) | Self::LocalOnly(s) => s,
        }
    }

    /// Returns true when the session must be persisted in the guest cookie
    /// rather than the provider session cookie.
    #[must_use]
    pub const fn is_cookie_backed(&self) -> bool {
        matches!(self, Self::PartialProvider(_) | Self::LocalOnly(_))
    }
}

/// Auth state changes emitted by the adapter.
///
/// Sign-in events carry the new session so observers can adopt it directly
/// instead of fetching it back from the provider.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Abstraction over the hosted identity service.
///
/// Handlers receive this as `Arc<dyn IdentityProvider>` so tests can inject a
/// scripted implementation.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::UserAlreadyExists`] for duplicate emails.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<AuthOutcome, IdentityError>;

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] on rejection.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthOutcome, IdentityError>;

    /// Create an anonymous provider session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::AnonymousSignInDisabled`] when the provider
    /// rejects anonymous sign-ins.
    async fn sign_in_anonymously(&self) -> Result<AuthOutcome, IdentityError>;

    /// Revoke a provider session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SyntheticToken`] for locally synthesized
    /// tokens, which have nothing to revoke at the provider.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Fetch the user behind an access token, with current verification state.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SyntheticToken`] for locally synthesized
    /// tokens.
    async fn get_user(&self, access_token: &str) -> Result<AuthOutcome, IdentityError>;

    /// Exchange a refresh token for a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] for revoked or unknown
    /// refresh tokens.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, IdentityError>;

    /// Send a password-reset email with a redirect back into the app.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Provider`] if the provider rejects the request.
    async fn reset_password(&self, email: &str, redirect_to: &str) -> Result<(), IdentityError>;

    /// Update the session user's attributes (email, password, metadata).
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SyntheticToken`] for locally synthesized
    /// tokens.
    async fn update_user(
        &self,
        access_token: &str,
        update: UserUpdate,
    ) -> Result<User, IdentityError>;

    /// Set a new password for the session's user.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SyntheticToken`] for locally synthesized
    /// tokens.
    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<User, IdentityError> {
        self.update_user(
            access_token,
            UserUpdate {
                password: Some(new_password.to_owned()),
                ..UserUpdate::default()
            },
        )
        .await
    }

    /// Exchange an email-confirmation or OAuth authorization code for a
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] for expired or unknown
    /// codes.
    async fn exchange_code(&self, code: &str) -> Result<Session, IdentityError>;

    /// Build the provider's Google OAuth authorization URL.
    fn google_authorize_url(&self, redirect_to: &str) -> String;

    /// Subscribe to auth state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Obtain a guest session, degrading through the fallback tiers.
    ///
    /// Never fails: the final tier is purely local.
    async fn sign_in_as_guest(&self) -> GuestSignIn {
        // Tier 1: provider-anonymous session.
        match self.sign_in_anonymously().await {
            Ok(outcome) => {
                if let Some(session) = outcome.session {
                    return GuestSignIn::Provider(session);
                }
            }
            Err(error) => {
                tracing::debug!(%error, "anonymous sign-in unavailable, trying guest signup");
            }
        }

        // Tier 2: signup of a synthesized guest account.
        let email = generate_guest_email();
        let password = generate_guest_password();
        let mut metadata = Map::new();
        metadata.insert("user_type".to_owned(), json!("guest"));

        match self.sign_up(&email, &password, metadata).await {
            Ok(outcome) => {
                if let Some(session) = outcome.session {
                    return GuestSignIn::Provider(session);
                }
                let session =
                    synthesize_session(outcome.user, "temp_", SYNTHETIC_SESSION_LIFETIME_SECS);
                return GuestSignIn::PartialProvider(session);
            }
            Err(error) => {
                tracing::warn!(%error, "guest signup failed, falling back to local identity");
            }
        }

        // Tier 3: fully local identity.
        GuestSignIn::LocalOnly(local_guest_session())
    }
}

/// Synthesize a guest email address. The local part carries a recognized
/// guest prefix so classification survives round-trips through the provider.
fn generate_guest_email() -> String {
    let timestamp = Utc::now().timestamp();
    let suffix: u32 = rand::rng().random();
    format!("guest_{timestamp}_{suffix:08x}@example.com")
}

/// Random throwaway password for synthesized guest accounts. Nobody ever
/// types it; guests reconnect via their cookie, not credentials.
fn generate_guest_password() -> String {
    let a: u64 = rand::rng().random();
    let b: u64 = rand::rng().random();
    format!("{a:016x}{b:016x}")
}

/// Build a fully local guest identity with a synthesized session.
fn local_guest_session() -> Session {
    let email = generate_guest_email();
    let mut metadata = Map::new();
    metadata.insert("user_type".to_owned(), json!("guest"));

    let user = User {
        id: UserId::random(),
        email: Some(email),
        display_name: Some("Guest".to_owned()),
        first_name: None,
        last_name: None,
        company_name: None,
        avatar_url: None,
        user_type: UserType::Guest,
        metadata,
    };

    synthesize_session(user, "guest_", SYNTHETIC_SESSION_LIFETIME_SECS)
}

/// Reject locally synthesized tokens before they reach the provider.
fn ensure_provider_token(access_token: &str) -> Result<(), IdentityError> {
    if SYNTHETIC_TOKEN_PREFIXES
        .iter()
        .any(|prefix| access_token.starts_with(prefix))
    {
        return Err(IdentityError::SyntheticToken);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Client
// ─────────────────────────────────────────────────────────────────────────────

/// Production [`IdentityProvider`] backed by the hosted identity service's
/// REST API.
#[derive(Clone)]
pub struct HttpIdentityClient {
    inner: Arc<HttpIdentityClientInner>,
}

struct HttpIdentityClientInner {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_key: String,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpIdentityClient {
    /// Create a new client from provider configuration.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HttpIdentityClientInner {
                http: reqwest::Client::new(),
                base_url: config.service_url.trim_end_matches('/').to_owned(),
                anon_key: config.anon_key.clone(),
                service_key: config.service_key.expose_secret().to_owned(),
                events,
            }),
        }
    }

    /// Profile-store accessor sharing this client's connection pool.
    #[must_use]
    pub fn profiles(&self) -> profiles::ProfileStore {
        profiles::ProfileStore::new(
            self.inner.http.clone(),
            self.inner.base_url.clone(),
            self.inner.service_key.clone(),
        )
    }

    fn emit(&self, event: AuthEvent) {
        // Nobody listening is fine; the send result only reports that.
        let _ = self.inner.events.send(event);
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.inner.base_url)
    }

    /// POST a JSON body to an auth endpoint with the publishable key.
    async fn post_auth(
        &self,
        path: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, IdentityError> {
        let mut request = self
            .inner
            .http
            .post(self.auth_url(path))
            .header("apikey", &self.inner.anon_key)
            .json(body);

        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        Ok(request.send().await?)
    }

    /// Map a non-success provider response to an [`IdentityError`].
    async fn provider_error(response: reqwest::Response) -> IdentityError {
        let status = response.status().as_u16();
        let body: ProviderErrorBody = response.json().await.unwrap_or(ProviderErrorBody {
            error_description: None,
            error_code: None,
        });

        let message = body
            .error_description
            .unwrap_or_else(|| "unknown provider error".to_owned());
        let code = body.error_code.unwrap_or_default();
        let lowered = message.to_lowercase();

        if code == "anonymous_provider_disabled" || lowered.contains("anonymous") {
            return IdentityError::AnonymousSignInDisabled;
        }
        if code == "user_already_exists" || lowered.contains("already registered") {
            return IdentityError::UserAlreadyExists;
        }
        if status == 400 && (code == "invalid_credentials" || lowered.contains("invalid")) {
            return IdentityError::InvalidCredentials;
        }

        IdentityError::Provider { status, message }
    }

    /// Decode an auth response body into an [`AuthOutcome`].
    fn decode_outcome(response: AuthResponse) -> Result<AuthOutcome, IdentityError> {
        let provider_user = response.user.ok_or(IdentityError::MissingUser)?;
        let email_confirmed = provider_user.is_email_confirmed();
        let user = format_user(&provider_user);
        let session = response
            .session
            .as_ref()
            .map(|s| format_session(s, user.clone()));

        Ok(AuthOutcome {
            user,
            session,
            email_confirmed,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<AuthOutcome, IdentityError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": metadata,
        });
        let response = self.post_auth("/signup", &body, None).await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let outcome = Self::decode_outcome(response.json().await?)?;
        if let Some(session) = &outcome.session {
            self.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthOutcome, IdentityError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .post_auth("/token?grant_type=password", &body, None)
            .await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let outcome = Self::decode_outcome(response.json().await?)?;
        if let Some(session) = &outcome.session {
            self.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_in_anonymously(&self) -> Result<AuthOutcome, IdentityError> {
        // Signup without credentials is the provider's anonymous flow.
        let body = json!({ "data": { "user_type": "guest" } });
        let response = self.post_auth("/signup", &body, None).await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let outcome = Self::decode_outcome(response.json().await?)?;
        if let Some(session) = &outcome.session {
            self.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        ensure_provider_token(access_token)?;

        let response = self
            .post_auth("/logout", &json!({}), Some(access_token))
            .await?;
        // 401 means the token was already dead, which is the state we wanted.
        if !response.status().is_success() && response.status().as_u16() != 401 {
            return Err(Self::provider_error(response).await);
        }

        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthOutcome, IdentityError> {
        ensure_provider_token(access_token)?;

        let response = self
            .inner
            .http
            .get(self.auth_url("/user"))
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let provider_user: ProviderUser = response.json().await?;
        let email_confirmed = provider_user.is_email_confirmed();
        Ok(AuthOutcome {
            user: format_user(&provider_user),
            session: None,
            email_confirmed,
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        let body = json!({ "refresh_token": refresh_token });
        let response = self
            .post_auth("/token?grant_type=refresh_token", &body, None)
            .await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let outcome = Self::decode_outcome(response.json().await?)?;
        outcome.session.ok_or(IdentityError::MissingSession)
    }

    async fn reset_password(&self, email: &str, redirect_to: &str) -> Result<(), IdentityError> {
        let body = json!({ "email": email });
        let response = self
            .inner
            .http
            .post(format!(
                "{}?redirect_to={}",
                self.auth_url("/recover"),
                urlencoding::encode(redirect_to)
            ))
            .header("apikey", &self.inner.anon_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }
        Ok(())
    }

    async fn update_user(
        &self,
        access_token: &str,
        update: UserUpdate,
    ) -> Result<User, IdentityError> {
        ensure_provider_token(access_token)?;

        let response = self
            .inner
            .http
            .put(self.auth_url("/user"))
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(access_token)
            .json(&update)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let provider_user: ProviderUser = response.json().await?;
        Ok(format_user(&provider_user))
    }

    async fn exchange_code(&self, code: &str) -> Result<Session, IdentityError> {
        let body = json!({ "auth_code": code });
        let response = self.post_auth("/token?grant_type=pkce", &body, None).await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let outcome = Self::decode_outcome(response.json().await?)?;
        let session = outcome.session.ok_or(IdentityError::MissingSession)?;
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn google_authorize_url(&self, redirect_to: &str) -> String {
        format!(
            "{}?provider=google&redirect_to={}",
            self.auth_url("/authorize"),
            urlencoding::encode(redirect_to)
        )
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}
