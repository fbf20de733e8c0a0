//! Auth state broadcaster: mirrors provider session events into an
//! in-memory snapshot for UI-facing consumers.
//!
//! One owner spawns the context at application start and tears it down on
//! shutdown. Events are applied by a single task, so snapshot updates are
//! serially ordered without extra locking; readers go through
//! [`AuthContextReader`], which fails loudly once the broadcaster is gone.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AuthEvent, AuthUser, IdentityProvider, TokenPair};

/// Point-in-time view of the authenticated user.
#[derive(Clone, Debug)]
pub struct AuthContextSnapshot {
    pub user: Option<AuthUser>,
    pub loading: bool,
}

#[derive(Debug, Error)]
pub enum ContextError {
    /// The broadcaster was never started or has been torn down.
    #[error("auth context is not initialized")]
    NotInitialized,
}

/// Owning handle for the broadcaster task. Dropping it stops the mirror and
/// invalidates every reader.
pub struct AuthContext {
    snapshot: watch::Receiver<AuthContextSnapshot>,
    task: JoinHandle<()>,
}

impl AuthContext {
    /// Resolve the current session once, then mirror provider events until
    /// torn down. `initial` carries the cookie-cached token pair when one
    /// exists at startup.
    #[must_use]
    pub fn spawn(provider: Arc<dyn IdentityProvider>, initial: Option<TokenPair>) -> Self {
        let (tx, rx) = watch::channel(AuthContextSnapshot {
            user: None,
            loading: true,
        });
        let events = provider.subscribe();

        let task = tokio::spawn(run(provider, initial, events, tx));

        Self { snapshot: rx, task }
    }

    /// Shared read accessor for the snapshot.
    #[must_use]
    pub fn reader(&self) -> AuthContextReader {
        AuthContextReader {
            rx: self.snapshot.clone(),
        }
    }

    /// Stop mirroring and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cheap, clonable snapshot accessor handed to consumers.
#[derive(Clone)]
pub struct AuthContextReader {
    rx: watch::Receiver<AuthContextSnapshot>,
}

impl AuthContextReader {
    /// Current snapshot.
    ///
    /// # Errors
    /// Returns [`ContextError::NotInitialized`] once the owning
    /// [`AuthContext`] has been torn down.
    pub fn current(&self) -> Result<AuthContextSnapshot, ContextError> {
        if self.rx.has_changed().is_err() {
            return Err(ContextError::NotInitialized);
        }
        Ok(self.rx.borrow().clone())
    }

    /// Wait until the snapshot satisfies `predicate`, returning it.
    ///
    /// # Errors
    /// Returns [`ContextError::NotInitialized`] if the broadcaster stops
    /// before the predicate holds.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&AuthContextSnapshot) -> bool,
    ) -> Result<AuthContextSnapshot, ContextError> {
        self.rx
            .wait_for(predicate)
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| ContextError::NotInitialized)
    }
}

async fn run(
    provider: Arc<dyn IdentityProvider>,
    initial: Option<TokenPair>,
    mut events: broadcast::Receiver<AuthEvent>,
    tx: watch::Sender<AuthContextSnapshot>,
) {
    // Hydrate once; a provider failure here degrades to anonymous rather
    // than wedging every consumer on `loading`.
    let user = match initial {
        Some(tokens) => match provider.get_session(&tokens).await {
            Ok(session) => session.map(|session| session.user),
            Err(err) => {
                warn!("Initial session resolve failed: {err}");
                None
            }
        },
        None => None,
    };

    if tx
        .send(AuthContextSnapshot {
            user,
            loading: false,
        })
        .is_err()
    {
        return;
    }

    loop {
        match events.recv().await {
            Ok(event) => {
                let user = match event {
                    AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                        Some(session.user)
                    }
                    AuthEvent::SignedOut => None,
                };
                if tx
                    .send(AuthContextSnapshot {
                        user,
                        loading: false,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Only the latest event matters; the next recv carries it.
                debug!("Auth event stream lagged by {skipped}");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{session_for, StaticIdentityProvider};
    use super::*;
    use crate::identity::AuthEvent;

    #[tokio::test]
    async fn hydrates_anonymous_without_initial_tokens() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let context = AuthContext::spawn(provider, None);
        let mut reader = context.reader();

        let snapshot = reader
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .expect("broadcaster running");
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn hydrates_from_initial_tokens() {
        let provider = Arc::new(StaticIdentityProvider::new());
        provider.add_session(session_for("u1", "access-1", "refresh-1"));

        let context = AuthContext::spawn(
            provider,
            Some(TokenPair {
                access_token: "access-1".to_string(),
                refresh_token: "refresh-1".to_string(),
            }),
        );
        let mut reader = context.reader();

        let snapshot = reader
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .expect("broadcaster running");
        assert_eq!(snapshot.user.expect("hydrated user").id, "u1");
    }

    #[tokio::test]
    async fn events_replace_the_user() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let context = AuthContext::spawn(provider.clone(), None);
        let mut reader = context.reader();

        reader
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .expect("broadcaster running");

        provider.emit(AuthEvent::SignedIn(session_for("u2", "a", "r")));
        let snapshot = reader
            .wait_for(|snapshot| snapshot.user.is_some())
            .await
            .expect("broadcaster running");
        assert_eq!(snapshot.user.expect("signed-in user").id, "u2");

        provider.emit(AuthEvent::SignedOut);
        let snapshot = reader
            .wait_for(|snapshot| snapshot.user.is_none())
            .await
            .expect("broadcaster running");
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn reader_fails_loudly_after_teardown() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let context = AuthContext::spawn(provider, None);
        let mut reader = context.reader();
        reader
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .expect("broadcaster running");

        context.shutdown().await;

        assert!(matches!(
            reader.current(),
            Err(ContextError::NotInitialized)
        ));
    }
}
