//! Auth configuration and per-process shared state.

use axum::http::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::cookie::{CookieJar, CookieOptions, WritePhase};
use super::storage::ProfileStore;
use crate::identity::IdentityProvider;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

/// Admin role string stored in `user_profiles.role`.
pub(crate) const ADMIN_ROLE: &str = "admin";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    cookie_domain: Option<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_domain: None,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    pub(crate) fn session_cookie_options(&self) -> CookieOptions {
        CookieOptions::default()
            .with_max_age(self.session_ttl_seconds())
            .with_secure(self.session_cookie_secure())
            .with_domain(self.cookie_domain.clone())
    }

    /// Authenticated landing page after login or impersonation.
    pub(crate) fn dashboard_url(&self) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}/dashboard")
    }

    /// Login page with an error marker, for failed callback legs.
    pub(crate) fn login_error_url(&self) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        format!("{base}/login?error=auth")
    }
}

pub struct AuthState {
    config: AuthConfig,
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    dropped_cookie_writes: Arc<AtomicU64>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            config,
            identity,
            profiles,
            dropped_cookie_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub(super) fn profiles(&self) -> &dyn ProfileStore {
        self.profiles.as_ref()
    }

    /// One jar per request/response pair.
    pub(crate) fn cookie_jar(&self, headers: &HeaderMap) -> CookieJar {
        CookieJar::from_headers(
            headers,
            WritePhase::Mutable,
            self.dropped_cookie_writes.clone(),
        )
    }

    /// Diagnostic: total cookie writes dropped in frozen phases since start.
    /// A climbing value means sessions are going stale silently.
    #[must_use]
    pub fn dropped_cookie_writes(&self) -> u64 {
        self.dropped_cookie_writes.load(Ordering::Relaxed)
    }
}
