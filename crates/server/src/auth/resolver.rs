//! Session resolution.
//!
//! Every request gets exactly one [`ResolvedIdentity`]. The resolver inspects
//! cookies in a fixed order, validates provider sessions against the provider
//! and the profile store, and tears down states the invariants forbid
//! (unverified accounts, verified accounts without a profile row). Failures
//! never surface to callers; a resolution that cannot be completed is
//! "no identity" and nothing more.

use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;

use crate::auth::guest::take_guest_record;
use crate::auth::session_cookie::{
    clear_session_cookie, read_session_cookie, write_session_cookie,
};
use crate::identity::IdentityProvider;
use crate::identity::profiles::ProfileLookup;
use crate::models::{ResolvedIdentity, Session};

/// A locally active guest identity wins over whatever the provider session
/// cookie holds. Named so the invariant is testable rather than an accident
/// of call order.
pub const GUEST_COOKIE_PRECEDENCE: bool = true;

/// Resolves the identity behind a request's cookies.
#[derive(Clone)]
pub struct SessionResolver {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileLookup>,
    secure_cookies: bool,
}

impl SessionResolver {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileLookup>,
        secure_cookies: bool,
    ) -> Self {
        Self {
            provider,
            profiles,
            secure_cookies,
        }
    }

    /// Resolve the request's identity, returning the possibly-mutated jar.
    ///
    /// The jar must be carried onto the response: expired guest cookies are
    /// cleared here, refreshed sessions are rewritten here, and dropping the
    /// jar silently undoes those mutations.
    pub async fn resolve(&self, jar: CookieJar) -> (CookieJar, ResolvedIdentity) {
        // Guest cookie first; see GUEST_COOKIE_PRECEDENCE.
        let (jar, guest) = if GUEST_COOKIE_PRECEDENCE {
            take_guest_record(jar)
        } else {
            (jar, None)
        };
        if let Some(record) = guest {
            return (jar, ResolvedIdentity::Guest(record.to_session()));
        }

        let Some(session) = read_session_cookie(&jar) else {
            return (jar, ResolvedIdentity::Anonymous);
        };

        // Provider-anonymous guests carry real tokens but need no
        // verification or profile; synthetic sessions could not pass
        // provider validation anyway.
        if session.user.is_guest() || session.is_synthetic() {
            return (jar, ResolvedIdentity::Guest(session));
        }

        self.resolve_provider_session(jar, session).await
    }

    /// Validate (and if needed refresh) a regular provider session.
    async fn resolve_provider_session(
        &self,
        jar: CookieJar,
        session: Session,
    ) -> (CookieJar, ResolvedIdentity) {
        let (jar, session) = match self.refresh_if_expired(jar, session).await {
            Ok(pair) => pair,
            Err(jar) => return (jar, ResolvedIdentity::Anonymous),
        };

        let outcome = match self.provider.get_user(&session.access_token).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::debug!(%error, "provider session rejected, clearing");
                return (clear_session_cookie(jar), ResolvedIdentity::Anonymous);
            }
        };

        // Regular accounts must be verified; fail closed and revoke.
        if !outcome.email_confirmed {
            tracing::info!(user_id = %outcome.user.id, "unverified account session, revoking");
            return (self.teardown(jar, &session).await, ResolvedIdentity::Anonymous);
        }

        // Verified identity and profile row must co-exist.
        match self.profiles.lookup(&outcome.user.id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(user_id = %outcome.user.id, "verified account missing profile, revoking");
                return (self.teardown(jar, &session).await, ResolvedIdentity::Anonymous);
            }
            Err(error) => {
                // Store unreachable: no identity, but nothing to tear down.
                tracing::debug!(%error, "profile lookup failed during resolution");
                return (jar, ResolvedIdentity::Anonymous);
            }
        }

        let session = Session {
            user: outcome.user,
            ..session
        };
        (jar, ResolvedIdentity::Authenticated(session))
    }

    /// Refresh an expired session in place, rewriting the cookie.
    ///
    /// On refresh failure the cookie is cleared and the jar is returned as
    /// the error value.
    async fn refresh_if_expired(
        &self,
        jar: CookieJar,
        session: Session,
    ) -> Result<(CookieJar, Session), CookieJar> {
        if !session.is_expired() {
            return Ok((jar, session));
        }

        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(fresh) => match write_session_cookie(jar.clone(), &fresh, self.secure_cookies) {
                Ok(jar) => Ok((jar, fresh)),
                Err(error) => {
                    // Keep the jar as received; earlier mutations survive.
                    tracing::error!(%error, "failed to serialize refreshed session");
                    Err(jar)
                }
            },
            Err(error) => {
                tracing::debug!(%error, "session refresh rejected, clearing");
                Err(clear_session_cookie(jar))
            }
        }
    }

    /// Forced sign-out: best-effort provider revocation plus cookie removal.
    async fn teardown(&self, jar: CookieJar, session: &Session) -> CookieJar {
        if let Err(error) = self.provider.sign_out(&session.access_token).await {
            tracing::debug!(%error, "provider sign-out during teardown failed");
        }
        clear_session_cookie(jar)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Map, Value, json};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    use parlor_core::{UserId, UserType};

    use crate::auth::guest::{GuestSessionRecord, write_guest_cookie};
    use crate::auth::session_cookie::{SESSION_COOKIE, write_session_cookie};
    use crate::identity::profiles::Profile;
    use crate::identity::{AuthEvent, AuthOutcome, IdentityError, UserUpdate};
    use crate::models::User;

    fn regular_user() -> User {
        User {
            id: UserId::from("acct-1"),
            email: Some("alice@example.com".to_owned()),
            display_name: Some("Alice".to_owned()),
            first_name: Some("Alice".to_owned()),
            last_name: None,
            company_name: None,
            avatar_url: None,
            user_type: UserType::Regular,
            metadata: Map::new(),
        }
    }

    fn guest_user() -> User {
        let mut metadata = Map::new();
        metadata.insert("user_type".to_owned(), json!("guest"));
        User {
            id: UserId::from("guest-1"),
            email: Some("guest_1700_aa@example.com".to_owned()),
            display_name: Some("Guest".to_owned()),
            first_name: None,
            last_name: None,
            company_name: None,
            avatar_url: None,
            user_type: UserType::Guest,
            metadata,
        }
    }

    fn provider_session(user: User, expires_in: i64) -> Session {
        Session {
            user,
            access_token: "provider-access".to_owned(),
            refresh_token: "provider-refresh".to_owned(),
            expires_at: Utc::now().timestamp() + expires_in,
        }
    }

    /// Provider double with configurable verification and refresh behavior.
    struct FakeProvider {
        email_confirmed: bool,
        refresh_result: Option<Session>,
        signed_out: Mutex<Vec<String>>,
        events: broadcast::Sender<AuthEvent>,
    }

    impl FakeProvider {
        fn new(email_confirmed: bool) -> Self {
            let (events, _) = broadcast::channel(4);
            Self {
                email_confirmed,
                refresh_result: None,
                signed_out: Mutex::new(Vec::new()),
                events,
            }
        }

        fn with_refresh(mut self, session: Session) -> Self {
            self.refresh_result = Some(session);
            self
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_up(
            &self,
            _email: &str,
            _password: &str,
            _metadata: Map<String, Value>,
        ) -> Result<AuthOutcome, IdentityError> {
            Err(IdentityError::MissingUser)
        }

        async fn sign_in(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<AuthOutcome, IdentityError> {
            Err(IdentityError::InvalidCredentials)
        }

        async fn sign_in_anonymously(&self) -> Result<AuthOutcome, IdentityError> {
            Err(IdentityError::AnonymousSignInDisabled)
        }

        async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
            self.signed_out.lock().unwrap().push(access_token.to_owned());
            Ok(())
        }

        async fn get_user(&self, access_token: &str) -> Result<AuthOutcome, IdentityError> {
            if access_token != "provider-access" && access_token != "refreshed-access" {
                return Err(IdentityError::InvalidCredentials);
            }
            Ok(AuthOutcome {
                user: regular_user(),
                session: None,
                email_confirmed: self.email_confirmed,
            })
        }

        async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, IdentityError> {
            self.refresh_result
                .clone()
                .ok_or(IdentityError::InvalidCredentials)
        }

        async fn reset_password(
            &self,
            _email: &str,
            _redirect_to: &str,
        ) -> Result<(), IdentityError> {
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

        fn google_authorize_url(&self, _redirect_to: &str) -> String {
            String::new()
        }

        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }
    }

    /// Profile double: present, absent, or failing.
    enum FakeProfiles {
        Present,
        Absent,
        Unreachable,
    }

    #[async_trait]
    impl ProfileLookup for FakeProfiles {
        async fn lookup(&self, user_id: &UserId) -> Result<Option<Profile>, IdentityError> {
            match self {
                Self::Present => Ok(Some(Profile {
                    id: user_id.clone(),
                    email: Some("alice@example.com".to_owned()),
                    display_name: Some("Alice".to_owned()),
                })),
                Self::Absent => Ok(None),
                Self::Unreachable => Err(IdentityError::Provider {
                    status: 503,
                    message: "unavailable".to_owned(),
                }),
            }
        }

        async fn ensure(&self, user: &User) -> Result<Profile, IdentityError> {
            Ok(Profile {
                id: user.id.clone(),
                email: user.email.clone(),
                display_name: user.display_name.clone(),
            })
        }
    }

    fn resolver(provider: FakeProvider, profiles: FakeProfiles) -> SessionResolver {
        SessionResolver::new(Arc::new(provider), Arc::new(profiles), false)
    }

    #[tokio::test]
    async fn test_no_cookies_resolves_anonymous() {
        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Present);
        let (_, identity) = resolver.resolve(CookieJar::new()).await;
        assert!(identity.is_anonymous());
    }

    #[tokio::test]
    async fn test_guest_cookie_beats_provider_session() {
        assert!(GUEST_COOKIE_PRECEDENCE);

        let record = GuestSessionRecord::from_user(&guest_user());
        let jar = write_guest_cookie(CookieJar::new(), &record, false).unwrap();
        let jar =
            write_session_cookie(jar, &provider_session(regular_user(), 3600), false).unwrap();

        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Present);
        let (_, identity) = resolver.resolve(jar).await;

        assert!(identity.is_guest());
        assert_eq!(identity.user().unwrap().id, record.id);
    }

    #[tokio::test]
    async fn test_valid_verified_session_resolves_authenticated() {
        let jar =
            write_session_cookie(CookieJar::new(), &provider_session(regular_user(), 3600), false)
                .unwrap();
        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Present);

        let (_, identity) = resolver.resolve(jar).await;
        let ResolvedIdentity::Authenticated(session) = identity else {
            panic!("expected authenticated identity");
        };
        assert_eq!(session.user.id.as_str(), "acct-1");
    }

    #[tokio::test]
    async fn test_unverified_session_is_torn_down() {
        let jar =
            write_session_cookie(CookieJar::new(), &provider_session(regular_user(), 3600), false)
                .unwrap();
        let resolver = resolver(FakeProvider::new(false), FakeProfiles::Present);

        let (jar, identity) = resolver.resolve(jar).await;
        assert!(identity.is_anonymous());
        // Cookie cleared: a second resolution also finds nothing.
        assert!(jar.get(SESSION_COOKIE).unwrap().value().is_empty());
    }

    #[tokio::test]
    async fn test_missing_profile_is_torn_down() {
        let jar =
            write_session_cookie(CookieJar::new(), &provider_session(regular_user(), 3600), false)
                .unwrap();
        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Absent);

        let (jar, identity) = resolver.resolve(jar).await;
        assert!(identity.is_anonymous());
        assert!(jar.get(SESSION_COOKIE).unwrap().value().is_empty());
    }

    #[tokio::test]
    async fn test_profile_store_outage_is_no_identity_without_teardown() {
        let session = provider_session(regular_user(), 3600);
        let jar = write_session_cookie(CookieJar::new(), &session, false).unwrap();
        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Unreachable);

        let (jar, identity) = resolver.resolve(jar).await;
        assert!(identity.is_anonymous());
        // Session cookie survives the outage.
        assert!(!jar.get(SESSION_COOKIE).unwrap().value().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_refreshes_and_rewrites_cookie() {
        let fresh = Session {
            access_token: "refreshed-access".to_owned(),
            refresh_token: "refreshed-refresh".to_owned(),
            ..provider_session(regular_user(), 3600)
        };
        let provider = FakeProvider::new(true).with_refresh(fresh.clone());
        let resolver = resolver(provider, FakeProfiles::Present);

        let jar =
            write_session_cookie(CookieJar::new(), &provider_session(regular_user(), -60), false)
                .unwrap();
        let (jar, identity) = resolver.resolve(jar).await;

        let ResolvedIdentity::Authenticated(session) = identity else {
            panic!("expected authenticated identity");
        };
        assert_eq!(session.access_token, "refreshed-access");

        let rewritten = crate::auth::session_cookie::read_session_cookie(&jar).unwrap();
        assert_eq!(rewritten.access_token, "refreshed-access");
    }

    #[tokio::test]
    async fn test_expired_session_with_failed_refresh_clears() {
        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Present);
        let jar =
            write_session_cookie(CookieJar::new(), &provider_session(regular_user(), -60), false)
                .unwrap();

        let (jar, identity) = resolver.resolve(jar).await;
        assert!(identity.is_anonymous());
        assert!(jar.get(SESSION_COOKIE).unwrap().value().is_empty());
    }

    #[tokio::test]
    async fn test_guest_provider_session_skips_validation() {
        // A tier-1 anonymous session is guest-typed with real tokens; it
        // resolves as guest with no verification or profile requirement.
        let session = provider_session(guest_user(), 3600);
        let jar = write_session_cookie(CookieJar::new(), &session, false).unwrap();
        let resolver = resolver(FakeProvider::new(false), FakeProfiles::Absent);

        let (_, identity) = resolver.resolve(jar).await;
        assert!(identity.is_guest());
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let record = GuestSessionRecord::from_user(&guest_user());
        let jar = write_guest_cookie(CookieJar::new(), &record, false).unwrap();
        let resolver = resolver(FakeProvider::new(true), FakeProfiles::Present);

        let (jar, first) = resolver.resolve(jar).await;
        let (_, second) = resolver.resolve(jar).await;
        assert_eq!(first, second);
    }
}
