//! Payment webhook ingestion.
//!
//! The notification body is unauthenticated external input that turns into
//! authoritative financial state, so the whole path is fail-closed: a
//! malformed order id on a finished payment is an error, never a skip. The
//! provider retries on non-2xx responses, which means nothing here may
//! escape the handler unhandled; every unexpected failure is caught, logged
//! and answered with a generic 500.
//!
//! When a signing secret is configured, the raw body must carry a valid
//! HMAC-SHA512 signature in `x-webhook-signature`. Without a secret the
//! check is skipped; do not run that way in production.

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::Sha512;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod storage;
pub mod types;

pub use storage::{DepositLedger, DepositOutcome, PgDepositLedger};
pub use types::PaymentNotification;

use anyhow::Context;
use types::OrderRef;

const STATUS_FINISHED: &str = "finished";
pub(crate) const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub struct WebhookState {
    ledger: Arc<dyn DepositLedger>,
    signing_secret: Option<SecretString>,
}

impl WebhookState {
    #[must_use]
    pub fn new(ledger: Arc<dyn DepositLedger>, signing_secret: Option<SecretString>) -> Self {
        Self {
            ledger,
            signing_secret,
        }
    }

    fn ledger(&self) -> &dyn DepositLedger {
        self.ledger.as_ref()
    }
}

/// What a processed notification amounted to.
#[derive(Debug, PartialEq, Eq)]
enum WebhookOutcome {
    /// Payment not finished yet; a legitimate non-event the sender may repeat.
    NotFinished,
    Credited,
    /// Redelivery of an already-credited notification; ledger unchanged.
    Duplicate,
}

#[utoipa::path(
    post,
    path = "/v1/webhooks/payment",
    request_body = PaymentNotification,
    responses(
        (status = 200, description = "Acknowledged: credited, duplicate, or not yet finished"),
        (status = 401, description = "Signature required and missing or invalid"),
        (status = 500, description = "Processing failed; sender will retry")
    ),
    tag = "webhooks"
)]
pub async fn payment(
    Extension(state): Extension<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(reason) = verify_signature(&state, &headers, &body) {
        warn!("Rejected webhook: {reason}");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid signature"})),
        )
            .into_response();
    }

    match process(&state, &body).await {
        Ok(WebhookOutcome::NotFinished) => (
            StatusCode::OK,
            Json(json!({"message": "Payment not completed"})),
        )
            .into_response(),
        Ok(WebhookOutcome::Credited | WebhookOutcome::Duplicate) => {
            (StatusCode::OK, Json(json!({"success": true}))).into_response()
        }
        Err(err) => {
            error!("Webhook processing failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Webhook Error"})),
            )
                .into_response()
        }
    }
}

async fn process(state: &WebhookState, body: &[u8]) -> anyhow::Result<WebhookOutcome> {
    let notification: PaymentNotification =
        serde_json::from_slice(body).context("malformed notification body")?;

    if notification.payment_status != STATUS_FINISHED {
        debug!(
            status = %notification.payment_status,
            order_id = %notification.order_id,
            "Ignoring unfinished payment notification"
        );
        return Ok(WebhookOutcome::NotFinished);
    }

    let order: OrderRef = notification
        .order_id
        .parse()
        .with_context(|| format!("unparseable order id {:?}", notification.order_id))?;

    match state
        .ledger()
        .record_deposit(
            &notification.order_id,
            order.user_id(),
            notification.price_amount,
        )
        .await?
    {
        DepositOutcome::Credited => {
            info!(
                user_id = %order.user_id(),
                amount = %notification.price_amount,
                order_id = %notification.order_id,
                "Credited deposit"
            );
            Ok(WebhookOutcome::Credited)
        }
        DepositOutcome::Duplicate => {
            info!(
                order_id = %notification.order_id,
                "Duplicate payment notification; ledger unchanged"
            );
            Ok(WebhookOutcome::Duplicate)
        }
    }
}

fn verify_signature(
    state: &WebhookState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), &'static str> {
    // No secret configured means no sender authentication at all. The gap
    // stays visible here instead of being papered over.
    let Some(secret) = &state.signing_secret else {
        return Ok(());
    };

    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return Err("missing signature header");
    };
    let provided = hex::decode(signature.trim()).map_err(|_| "signature is not hex")?;

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| "invalid signing secret")?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| "signature mismatch")
}
