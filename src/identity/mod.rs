//! Identity provider client and session types.
//!
//! The provider is an external service that owns session-token cryptography;
//! this crate only holds a cached reference to a session (the cookie value)
//! and a renewal obligation. All calls here are I/O-bound and suspend until
//! the provider answers or the transport times out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

mod client;
pub mod context;

pub use client::{HttpIdentityProvider, IdentityConfig};

/// Access/refresh credential pair, the opaque value cached in the session cookie.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Profile data the provider attaches to a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// A live provider session, bound to exactly one user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    #[must_use]
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Session lifecycle events mirrored into the auth context.
#[derive(Clone, Debug)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Provider URL or service key unset. Raised when building the client,
    /// before any network call.
    #[error("identity provider is not configured")]
    Unconfigured,
    /// The provider rejected a credential pair outright.
    #[error("identity provider rejected the credential pair")]
    Rejected,
    /// Transport or server-side failure talking to the provider.
    #[error("identity provider request failed: {0}")]
    Upstream(String),
    /// The provider answered with a payload we cannot decode.
    #[error("identity provider returned an unexpected payload")]
    Payload,
}

/// Abstract identity provider. Production uses [`HttpIdentityProvider`];
/// tests substitute an in-memory double behind the same seam.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a cached token pair into a live session.
    ///
    /// `Ok(None)` is the anonymous, non-error state: the pair is absent,
    /// expired, or revoked. Transport failures are `Err`.
    async fn get_session(&self, tokens: &TokenPair) -> Result<Option<Session>, Error>;

    /// Install a session from a stored credential pair, superseding whatever
    /// session the same cookie scope held before. Emits `SignedIn`.
    async fn set_session(&self, tokens: &TokenPair) -> Result<Session, Error>;

    /// Trade a login-return auth code for a session. Emits `SignedIn`.
    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, Error>;

    /// Invalidate the session server-side. Emits `SignedOut` regardless of
    /// whether the provider still knew the session.
    async fn sign_out(&self, tokens: &TokenPair) -> Result<(), Error>;

    /// Subscribe to session lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider double shared by handler and context tests.

    use super::{AuthEvent, AuthUser, Error, IdentityProvider, Session, TokenPair};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    pub(crate) struct StaticIdentityProvider {
        events: broadcast::Sender<AuthEvent>,
        sessions: Mutex<HashMap<String, Session>>,
        reject_installs: AtomicBool,
        set_session_calls: AtomicUsize,
    }

    impl StaticIdentityProvider {
        pub(crate) fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                events,
                sessions: Mutex::new(HashMap::new()),
                reject_installs: AtomicBool::new(false),
                set_session_calls: AtomicUsize::new(0),
            }
        }

        /// Register a session keyed by its access token.
        pub(crate) fn add_session(&self, session: Session) {
            self.sessions
                .lock()
                .expect("sessions lock poisoned")
                .insert(session.access_token.clone(), session);
        }

        /// Register a session returned for `access_token` that carries a
        /// different (rotated) token pair.
        pub(crate) fn add_rotated_session(&self, access_token: &str, session: Session) {
            self.sessions
                .lock()
                .expect("sessions lock poisoned")
                .insert(access_token.to_string(), session);
        }

        pub(crate) fn reject_installs(&self) {
            self.reject_installs.store(true, Ordering::Relaxed);
        }

        pub(crate) fn set_session_calls(&self) -> usize {
            self.set_session_calls.load(Ordering::Relaxed)
        }

        pub(crate) fn emit(&self, event: AuthEvent) {
            let _ = self.events.send(event);
        }

        fn lookup(&self, access_token: &str) -> Option<Session> {
            self.sessions
                .lock()
                .expect("sessions lock poisoned")
                .get(access_token)
                .cloned()
        }
    }

    pub(crate) fn session_for(uid: &str, access: &str, refresh: &str) -> Session {
        Session {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at: None,
            user: AuthUser {
                id: uid.to_string(),
                email: Some(format!("{uid}@example.com")),
            },
        }
    }

    #[async_trait]
    impl IdentityProvider for StaticIdentityProvider {
        async fn get_session(&self, tokens: &TokenPair) -> Result<Option<Session>, Error> {
            Ok(self.lookup(&tokens.access_token))
        }

        async fn set_session(&self, tokens: &TokenPair) -> Result<Session, Error> {
            self.set_session_calls.fetch_add(1, Ordering::Relaxed);
            if self.reject_installs.load(Ordering::Relaxed) {
                return Err(Error::Rejected);
            }
            let session = self.lookup(&tokens.access_token).ok_or(Error::Rejected)?;
            let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
            Ok(session)
        }

        async fn exchange_code_for_session(&self, code: &str) -> Result<Session, Error> {
            let session = self.lookup(code).ok_or(Error::Rejected)?;
            let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
            Ok(session)
        }

        async fn sign_out(&self, _tokens: &TokenPair) -> Result<(), Error> {
            let _ = self.events.send(AuthEvent::SignedOut);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tokens_returns_pair() {
        let session = Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Some(1_700_000_000),
            user: AuthUser {
                id: "u1".to_string(),
                email: None,
            },
        };
        let pair = session.tokens();
        assert_eq!(pair.access_token, "access");
        assert_eq!(pair.refresh_token, "refresh");
    }

    #[test]
    fn error_messages_do_not_leak_tokens() {
        assert_eq!(
            Error::Unconfigured.to_string(),
            "identity provider is not configured"
        );
        assert_eq!(
            Error::Rejected.to_string(),
            "identity provider rejected the credential pair"
        );
    }
}
