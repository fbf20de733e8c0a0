//! Wire types for payment notifications.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Raw notification body from the payment provider. Unauthenticated input;
/// nothing in here is trusted until parsed and validated.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PaymentNotification {
    pub payment_status: String,
    pub order_id: String,
    pub price_amount: Decimal,
}

/// Typed `<user_id>-<opaque-suffix>` order reference.
///
/// The user id is recovered by parsing, never by lookup: the prefix up to
/// the first `-` is the foreign key for the ledger write. The parse fails
/// closed; a malformed order id on a finished payment is a processing
/// error, because silently dropping it would lose money.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRef {
    user_id: String,
    suffix: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderRefError {
    #[error("order id is empty")]
    Empty,
    #[error("order id has no user prefix")]
    MissingUserId,
    #[error("order id has no suffix")]
    MissingSuffix,
}

impl OrderRef {
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl FromStr for OrderRef {
    type Err = OrderRefError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(OrderRefError::Empty);
        }
        let Some((user_id, suffix)) = raw.split_once('-') else {
            return Err(OrderRefError::MissingSuffix);
        };
        if user_id.is_empty() {
            return Err(OrderRefError::MissingUserId);
        }
        if suffix.is_empty() {
            return Err(OrderRefError::MissingSuffix);
        }
        Ok(Self {
            user_id: user_id.to_string(),
            suffix: suffix.to_string(),
        })
    }
}
