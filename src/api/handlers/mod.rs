//! HTTP handlers.

pub mod auth;
pub mod health;
pub mod webhook;

use axum::response::IntoResponse;

/// Service banner for `/`.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
