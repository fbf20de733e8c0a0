//! Deposit ledger writes.
//!
//! The ledger is append-only through this path and only `approved` rows may
//! reach it. Idempotency lives in the storage layer, not in handler
//! coordination: `deposits.order_id` is unique, and a conflicting insert is
//! a successful no-op.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::Instrument;

pub(crate) const DEPOSIT_STATUS_APPROVED: &str = "approved";

/// Result of an idempotent credit attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DepositOutcome {
    Credited,
    /// Same order id seen before; the ledger is unchanged.
    Duplicate,
}

#[async_trait]
pub trait DepositLedger: Send + Sync {
    /// Record one approved deposit keyed by the external order id.
    async fn record_deposit(
        &self,
        order_id: &str,
        user_id: &str,
        amount: Decimal,
    ) -> Result<DepositOutcome>;
}

pub struct PgDepositLedger {
    pool: PgPool,
}

impl PgDepositLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DepositLedger for PgDepositLedger {
    async fn record_deposit(
        &self,
        order_id: &str,
        user_id: &str,
        amount: Decimal,
    ) -> Result<DepositOutcome> {
        let query = r"
            INSERT INTO deposits (order_id, user_id, amount, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(order_id)
            .bind(user_id)
            .bind(amount)
            .bind(DEPOSIT_STATUS_APPROVED)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert deposit")?;

        if result.rows_affected() == 0 {
            return Ok(DepositOutcome::Duplicate);
        }
        Ok(DepositOutcome::Credited)
    }
}

#[cfg(test)]
pub(crate) use memory::{DepositRow, MemoryDepositLedger};

#[cfg(test)]
mod memory {
    //! In-memory ledger double for handler tests.

    use super::{DepositLedger, DepositOutcome, DEPOSIT_STATUS_APPROVED};
    use anyhow::Result;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) struct DepositRow {
        pub(crate) order_id: String,
        pub(crate) user_id: String,
        pub(crate) amount: Decimal,
        pub(crate) status: String,
    }

    pub(crate) struct MemoryDepositLedger {
        rows: Mutex<Vec<DepositRow>>,
    }

    impl MemoryDepositLedger {
        pub(crate) fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn rows(&self) -> Vec<DepositRow> {
            self.rows.lock().expect("rows lock poisoned").clone()
        }
    }

    #[async_trait]
    impl DepositLedger for MemoryDepositLedger {
        async fn record_deposit(
            &self,
            order_id: &str,
            user_id: &str,
            amount: Decimal,
        ) -> Result<DepositOutcome> {
            let mut rows = self.rows.lock().expect("rows lock poisoned");
            if rows.iter().any(|row| row.order_id == order_id) {
                return Ok(DepositOutcome::Duplicate);
            }
            rows.push(DepositRow {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                amount,
                status: DEPOSIT_STATUS_APPROVED.to_string(),
            });
            Ok(DepositOutcome::Credited)
        }
    }
}
