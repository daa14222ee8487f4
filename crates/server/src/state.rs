//! Shared application state.

use std::sync::Arc;

use crate::auth::SessionResolver;
use crate::config::ServerConfig;
use crate::identity::IdentityProvider;
use crate::identity::profiles::ProfileLookup;

/// Application state shared across all request handlers.
///
/// Cheap to clone; all fields live behind one `Arc`. The identity provider
/// and profile store are injected so tests can swap in scripted
/// implementations.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileLookup>,
    resolver: SessionResolver,
}

impl AppState {
    /// Assemble state from configuration and injected collaborators.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        let resolver = SessionResolver::new(
            Arc::clone(&provider),
            Arc::clone(&profiles),
            config.is_secure(),
        );
        Self {
            inner: Arc::new(AppStateInner {
                config,
                provider,
                profiles,
                resolver,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.provider
    }

    #[must_use]
    pub fn profiles(&self) -> &Arc<dyn ProfileLookup> {
        &self.inner.profiles
    }

    #[must_use]
    pub fn resolver(&self) -> &SessionResolver {
        &self.inner.resolver
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.inner.config.is_secure()
    }
}
