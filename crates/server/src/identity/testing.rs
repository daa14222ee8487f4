//! Scripted identity doubles for router-level tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

use parlor_core::{UserId, UserType};

use crate::identity::profiles::{Profile, ProfileLookup};
use crate::identity::{AuthEvent, AuthOutcome, IdentityError, IdentityProvider, UserUpdate};
use crate::models::{Session, User};

pub fn stub_regular_user(id: &str) -> User {
    User {
        id: UserId::from(id),
        email: Some(format!("{id}@example.com")),
        display_name: Some("Test User".to_owned()),
        first_name: Some("Test".to_owned()),
        last_name: Some("User".to_owned()),
        company_name: None,
        avatar_url: None,
        user_type: UserType::Regular,
        metadata: Map::new(),
    }
}

pub fn stub_guest_user(id: &str) -> User {
    let mut metadata = Map::new();
    metadata.insert("user_type".to_owned(), json!("guest"));
    User {
        id: UserId::from(id),
        email: Some(format!("guest_{id}@example.com")),
        display_name: Some("Guest".to_owned()),
        first_name: None,
        last_name: None,
        company_name: None,
        avatar_url: None,
        user_type: UserType::Guest,
        metadata,
    }
}

pub fn stub_session(user: User, expires_in: i64) -> Session {
    Session {
        user,
        access_token: "stub-access-token".to_owned(),
        refresh_token: "stub-refresh-token".to_owned(),
        expires_at: Utc::now().timestamp() + expires_in,
    }
}

/// Provider double driven by preset results.
pub struct StubProvider {
    pub sign_in_result: Mutex<Option<Result<AuthOutcome, IdentityError>>>,
    pub anonymous_result: Mutex<Option<Result<AuthOutcome, IdentityError>>>,
    pub signup_result: Mutex<Option<Result<AuthOutcome, IdentityError>>>,
    pub get_user_result: Mutex<Option<Result<AuthOutcome, IdentityError>>>,
    pub revoked_tokens: Mutex<Vec<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for StubProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            sign_in_result: Mutex::new(None),
            anonymous_result: Mutex::new(None),
            signup_result: Mutex::new(None),
            get_user_result: Mutex::new(None),
            revoked_tokens: Mutex::new(Vec::new()),
            events,
        }
    }
}

fn take(slot: &Mutex<Option<Result<AuthOutcome, IdentityError>>>) -> Result<AuthOutcome, IdentityError> {
    slot.lock()
        .map_err(|_| IdentityError::MissingUser)?
        .take()
        .unwrap_or(Err(IdentityError::InvalidCredentials))
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _metadata: Map<String, Value>,
    ) -> Result<AuthOutcome, IdentityError> {
        take(&self.signup_result)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthOutcome, IdentityError> {
        take(&self.sign_in_result)
    }

    async fn sign_in_anonymously(&self) -> Result<AuthOutcome, IdentityError> {
        take(&self.anonymous_result)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        if let Ok(mut revoked) = self.revoked_tokens.lock() {
            revoked.push(access_token.to_owned());
        }
        Ok(())
    }

    async fn get_user(&self, _access_token: &str) -> Result<AuthOutcome, IdentityError> {
        take(&self.get_user_result)
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, IdentityError> {
        Err(IdentityError::InvalidCredentials)
    }

    async fn reset_password(&self, _email: &str, _redirect_to: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn update_user(
        &self,
        _access_token: &str,
        _update: UserUpdate,
    ) -> Result<User, IdentityError> {
        Err(IdentityError::InvalidCredentials)
    }

    async fn exchange_code(&self, _code: &str) -> Result<Session, IdentityError> {
        Err(IdentityError::InvalidCredentials)
    }

    fn google_authorize_url(&self, redirect_to: &str) -> String {
        format!("https://id.test.invalid/auth/v1/authorize?provider=google&redirect_to={redirect_to}")
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Profile double: every user has a profile unless told otherwise.
pub struct StubProfiles {
    pub present: bool,
}

#[async_trait]
impl ProfileLookup for StubProfiles {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<Profile>, IdentityError> {
        Ok(self.present.then(|| Profile {
            id: user_id.clone(),
            email: None,
            display_name: None,
        }))
    }

    async fn ensure(&self, user: &User) -> Result<Profile, IdentityError> {
        Ok(Profile {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
        })
    }
}
