//! Reactive auth state for long-lived clients.
//!
//! UI sessions (SSE streams, websockets, anything that outlives a single
//! request) observe auth state through a watch channel instead of
//! re-resolving cookies per interaction. The store tracks two inputs: the
//! provider's auth-event broadcast, and a pluggable watcher over the cookie
//! state. On start the guest cookie is consulted first, then the stored
//! provider session. Cookies have no native change notification, so the
//! watcher is polled; an update is emitted only when the guest identity's ID
//! actually changes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use parlor_core::UserId;

use crate::auth::guest::GuestSessionRecord;
use crate::identity::{AuthEvent, IdentityProvider};
use crate::models::{Session, User};

/// How often the guest cookie watcher is polled.
pub const GUEST_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Snapshot of auth state as observed by the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthState {
    pub session: Option<Session>,
    pub is_loading: bool,
}

impl AuthState {
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match &self.session {
            Some(session) => Some(&session.user),
            None => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.user.is_guest())
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.user.is_guest())
    }
}

/// Source of externally mutated cookie state.
///
/// Cookies are owned by the transport, not the store; this seam lets the
/// store observe them without knowing where they live, and lets tests script
/// them directly.
#[async_trait]
pub trait CookieStateSource: Send + Sync {
    /// The current guest record, if one is active.
    async fn current_guest(&self) -> Option<GuestSessionRecord>;

    /// The current provider session, if one is stored.
    async fn current_session(&self) -> Option<Session>;
}

/// Reactive auth store.
///
/// Owns two background tasks for its whole lifetime: the provider event
/// subscription and the guest cookie poll. Both are aborted on drop.
pub struct AuthStore {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<AuthState>,
    tasks: Vec<JoinHandle<()>>,
}

impl AuthStore {
    /// Create the store and start its watchers.
    ///
    /// Initial state is resolved immediately: an active guest record wins,
    /// otherwise the stored provider session seeds the state, mirroring
    /// request-time resolution precedence.
    pub async fn new(
        provider: Arc<dyn IdentityProvider>,
        cookies: Arc<dyn CookieStateSource>,
        poll_interval: Duration,
    ) -> Self {
        let initial_guest = cookies.current_guest().await;
        let session = match &initial_guest {
            Some(record) => Some(record.to_session()),
            None => cookies.current_session().await,
        };
        let initial = AuthState {
            session,
            is_loading: false,
        };
        let (state, _) = watch::channel(initial);

        let events_task = tokio::spawn(Self::watch_provider_events(
            provider.subscribe(),
            state.clone(),
        ));
        let poll_task = tokio::spawn(Self::watch_guest_cookie(
            cookies,
            state.clone(),
            poll_interval,
            initial_guest.map(|record| record.id),
        ));

        Self {
            provider,
            state,
            tasks: vec![events_task, poll_task],
        }
    }

    /// Subscribe to auth state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Sign in through the provider and publish the resulting state.
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection unchanged.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, crate::identity::IdentityError> {
        let outcome = self.provider.sign_in(email, password).await?;
        let session = outcome
            .session
            .ok_or(crate::identity::IdentityError::MissingSession)?;
        self.state.send_replace(AuthState {
            session: Some(session.clone()),
            is_loading: false,
        });
        Ok(session)
    }

    /// Sign out the current session, local state first.
    ///
    /// State is cleared even when provider revocation fails; the user asked
    /// to leave and the local view must honor that.
    pub async fn sign_out(&self) {
        let session = self.state.borrow().session.clone();
        self.state.send_replace(AuthState::default());

        if let Some(session) = session
            && !session.is_synthetic()
            && let Err(error) = self.provider.sign_out(&session.access_token).await
        {
            tracing::debug!(%error, "provider sign-out failed");
        }
    }

    async fn watch_provider_events(
        mut events: tokio::sync::broadcast::Receiver<AuthEvent>,
        state: watch::Sender<AuthState>,
    ) {
        loop {
            match events.recv().await {
                Ok(AuthEvent::SignedIn(session)) => {
                    // A locally active guest is not displaced by provider
                    // events for other identities.
                    let current_is_guest = state.borrow().is_guest();
                    if current_is_guest && !session.user.is_guest() {
                        continue;
                    }
                    state.send_if_modified(|current| {
                        if current.session.as_ref() == Some(&session) {
                            return false;
                        }
                        current.session = Some(session.clone());
                        current.is_loading = false;
                        true
                    });
                }
                Ok(AuthEvent::SignedOut) => {
                    state.send_replace(AuthState::default());
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "auth event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn watch_guest_cookie(
        cookies: Arc<dyn CookieStateSource>,
        state: watch::Sender<AuthState>,
        poll_interval: Duration,
        mut last_guest_id: Option<UserId>,
    ) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it, initial state is set.
        interval.tick().await;

        loop {
            interval.tick().await;

            let guest = cookies.current_guest().await;
            let guest_id = guest.as_ref().map(|record| record.id.clone());
            if guest_id == last_guest_id {
                continue;
            }
            last_guest_id = guest_id;

            state.send_replace(AuthState {
                session: guest.as_ref().map(GuestSessionRecord::to_session),
                is_loading: false,
            });
        }
    }
}

impl Drop for AuthStore {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
