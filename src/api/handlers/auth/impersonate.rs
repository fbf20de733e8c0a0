//! Admin impersonation: mint a session as another user.
//!
//! The service step installs a session from the profile's *stored*
//! impersonation credential pair; it performs no authorization check of its
//! own and assumes its caller is already privileged. The handler enforces
//! that assumption explicitly by requiring an admin-role caller before any
//! target lookup, rather than trusting the network path.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::{
    session::{install_session_cookie, resolve},
    state::{AuthState, ADMIN_ROLE},
    types::ImpersonateRequest,
    utils::valid_uid,
};
use crate::identity::Session;

#[derive(Debug, Error)]
pub(crate) enum ImpersonateError {
    #[error("user not found")]
    UserNotFound,
    /// Provider refused or failed the session install. Details stay in the
    /// server log; the client sees only a generic failure.
    #[error("session install failed")]
    Provider,
    #[error("profile lookup failed")]
    Storage,
}

/// Install a session as `uid` from the stored impersonation credential pair.
///
/// No authorization check happens here; callers must have already gated
/// access to this operation.
pub(crate) async fn impersonate_user(
    state: &AuthState,
    uid: &str,
) -> Result<Session, ImpersonateError> {
    let profile = state.profiles().fetch_profile(uid).await.map_err(|err| {
        error!("Failed to fetch profile for impersonation: {err:#}");
        ImpersonateError::Storage
    })?;
    let Some(profile) = profile else {
        return Err(ImpersonateError::UserNotFound);
    };

    state
        .identity()
        .set_session(&profile.impersonation_tokens)
        .await
        .map_err(|err| {
            error!("Failed to install impersonated session: {err}");
            ImpersonateError::Provider
        })
}

#[utoipa::path(
    post,
    path = "/v1/auth/impersonate",
    request_body = ImpersonateRequest,
    responses(
        (status = 200, description = "Session installed as the target user"),
        (status = 400, description = "Missing uid"),
        (status = 401, description = "No authenticated caller"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found"),
        (status = 502, description = "Session install failed")
    ),
    tag = "auth"
)]
pub async fn impersonate(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<ImpersonateRequest>>,
) -> Response {
    let mut jar = state.cookie_jar(&headers);

    // Every exit carries the jar's headers: resolving the caller may stage a
    // rotated token pair whose old refresh token the provider has already
    // consumed, and dropping that write would log the caller out.

    // Authorization gate: only a caller whose own resolved session carries
    // the admin role may reach the service step.
    let caller = match resolve(&state, &mut jar).await {
        Ok(resolved) => match resolved.user {
            Some(user) => user,
            None => {
                return (
                    StatusCode::UNAUTHORIZED,
                    jar.into_response_headers(),
                    Json(json!({"error": "Unauthorized"})),
                )
                    .into_response()
            }
        },
        Err(err) => {
            error!("Failed to resolve caller session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                jar.into_response_headers(),
                Json(json!({"error": "Impersonation failed"})),
            )
                .into_response();
        }
    };

    match state.profiles().fetch_profile(&caller.id).await {
        Ok(Some(profile)) if profile.role == ADMIN_ROLE => {}
        Ok(_) => {
            return (
                StatusCode::FORBIDDEN,
                jar.into_response_headers(),
                Json(json!({"error": "Forbidden"})),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to fetch caller profile: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                jar.into_response_headers(),
                Json(json!({"error": "Impersonation failed"})),
            )
                .into_response();
        }
    }

    // Validation runs before any target lookup.
    let uid = payload
        .and_then(|Json(request)| request.uid)
        .map(|uid| uid.trim().to_string())
        .filter(|uid| !uid.is_empty());
    let Some(uid) = uid else {
        return (
            StatusCode::BAD_REQUEST,
            jar.into_response_headers(),
            Json(json!({"error": "Missing uid"})),
        )
            .into_response();
    };
    if !valid_uid(&uid) {
        return (
            StatusCode::BAD_REQUEST,
            jar.into_response_headers(),
            Json(json!({"error": "Invalid uid"})),
        )
            .into_response();
    }

    match impersonate_user(&state, &uid).await {
        Ok(session) => {
            // The new session supersedes the caller's own in this cookie scope.
            install_session_cookie(&state, &mut jar, &session);
            info!(admin = %caller.id, target = %uid, "Impersonation session installed");
            (
                StatusCode::OK,
                jar.into_response_headers(),
                Json(json!({"success": true})),
            )
                .into_response()
        }
        Err(ImpersonateError::UserNotFound) => (
            StatusCode::NOT_FOUND,
            jar.into_response_headers(),
            Json(json!({"error": "User not found"})),
        )
            .into_response(),
        Err(ImpersonateError::Provider) => (
            StatusCode::BAD_GATEWAY,
            jar.into_response_headers(),
            Json(json!({"error": "Impersonation failed"})),
        )
            .into_response(),
        Err(ImpersonateError::Storage) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            jar.into_response_headers(),
            Json(json!({"error": "Impersonation failed"})),
        )
            .into_response(),
    }
}
