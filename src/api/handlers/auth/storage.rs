//! Profile lookups backing impersonation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use crate::identity::TokenPair;

/// One `user_profiles` row, including the stored impersonation credential
/// pair (not the user's live login credentials).
#[derive(Clone, Debug)]
pub struct ProfileRecord {
    pub uid: String,
    pub role: String,
    pub impersonation_tokens: TokenPair,
}

/// Read-only view over `user_profiles`.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch one profile by uid. `Ok(None)` when absent.
    async fn fetch_profile(&self, uid: &str) -> Result<Option<ProfileRecord>>;
}

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn fetch_profile(&self, uid: &str) -> Result<Option<ProfileRecord>> {
        let query = r"
            SELECT uid, role, impersonation_access_token, impersonation_refresh_token
            FROM user_profiles
            WHERE uid = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(uid)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user profile")?;

        Ok(row.map(|row| ProfileRecord {
            uid: row.get("uid"),
            role: row.get("role"),
            impersonation_tokens: TokenPair {
                access_token: row.get("impersonation_access_token"),
                refresh_token: row.get("impersonation_refresh_token"),
            },
        }))
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryProfileStore;

#[cfg(test)]
mod memory {
    //! In-memory store double for handler tests.

    use super::{ProfileRecord, ProfileStore};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct MemoryProfileStore {
        profiles: Mutex<HashMap<String, ProfileRecord>>,
        lookups: AtomicUsize,
    }

    impl MemoryProfileStore {
        pub(crate) fn new() -> Self {
            Self {
                profiles: Mutex::new(HashMap::new()),
                lookups: AtomicUsize::new(0),
            }
        }

        pub(crate) fn insert(&self, record: ProfileRecord) {
            self.profiles
                .lock()
                .expect("profiles lock poisoned")
                .insert(record.uid.clone(), record);
        }

        pub(crate) fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfileStore {
        async fn fetch_profile(&self, uid: &str) -> Result<Option<ProfileRecord>> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            Ok(self
                .profiles
                .lock()
                .expect("profiles lock poisoned")
                .get(uid)
                .cloned())
        }
    }
}
