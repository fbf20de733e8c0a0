//! Session resolution and lifecycle endpoints.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect},
};
use std::sync::Arc;
use tracing::{error, warn};

use super::{
    cookie::{decode_session_cookie, encode_session_cookie, CookieJar, SESSION_COOKIE_NAME},
    state::AuthState,
    types::{CallbackQuery, SessionResponse},
};
use crate::identity::{self, AuthUser, Session};

/// Outcome of resolving the adapter's cookie. An anonymous visitor is a
/// valid, non-error state: both fields are simply `None`.
pub(crate) struct Resolved {
    pub(crate) session: Option<Session>,
    pub(crate) user: Option<AuthUser>,
}

/// Resolve the session cookie into a `(session, user)` pair.
///
/// When the provider rotates the token pair, the fresh pair is written back
/// through the adapter; that write is best-effort and may be dropped in a
/// frozen phase.
pub(crate) async fn resolve(
    state: &AuthState,
    jar: &mut CookieJar,
) -> Result<Resolved, identity::Error> {
    let Some(tokens) = jar.get(SESSION_COOKIE_NAME).and_then(decode_session_cookie) else {
        return Ok(Resolved {
            session: None,
            user: None,
        });
    };

    match state.identity().get_session(&tokens).await? {
        Some(session) => {
            if session.tokens() != tokens {
                install_session_cookie(state, jar, &session);
            }
            Ok(Resolved {
                user: Some(session.user.clone()),
                session: Some(session),
            })
        }
        None => Ok(Resolved {
            session: None,
            user: None,
        }),
    }
}

/// Write the session's token pair into the cookie scope, superseding
/// whatever session lived there before.
pub(crate) fn install_session_cookie(state: &AuthState, jar: &mut CookieJar, session: &Session) {
    match encode_session_cookie(&session.tokens()) {
        Ok(value) => jar.set(
            SESSION_COOKIE_NAME,
            &value,
            state.config().session_cookie_options(),
        ),
        Err(err) => warn!("Failed to encode session cookie: {err}"),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "Anonymous visitor, no session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let mut jar = state.cookie_jar(&headers);
    match resolve(&state, &mut jar).await {
        Ok(Resolved {
            session: Some(session),
            user: Some(user),
        }) => {
            let response = SessionResponse {
                user_id: user.id,
                email: user.email,
                expires_at: session.expires_at,
            };
            (
                StatusCode::OK,
                jar.into_response_headers(),
                Json(response),
            )
                .into_response()
        }
        Ok(_) => (StatusCode::NO_CONTENT, jar.into_response_headers()).into_response(),
        Err(err) => {
            error!("Failed to resolve session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let mut jar = state.cookie_jar(&headers);

    if let Some(tokens) = jar.get(SESSION_COOKIE_NAME).and_then(decode_session_cookie) {
        if let Err(err) = state.identity().sign_out(&tokens).await {
            error!("Provider sign-out failed: {err}");
        }
    }

    // Always overwrite the cookie, even when no session was found.
    jar.remove(SESSION_COOKIE_NAME, state.config().session_cookie_options());
    (StatusCode::NO_CONTENT, jar.into_response_headers()).into_response()
}

/// Login return leg: trade the provider's auth code for a session and land
/// the client on the authenticated area.
pub async fn callback(
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return Redirect::to(&state.config().login_error_url()).into_response();
    };

    let mut jar = state.cookie_jar(&headers);
    match state.identity().exchange_code_for_session(&code).await {
        Ok(session) => {
            install_session_cookie(&state, &mut jar, &session);
            (
                jar.into_response_headers(),
                Redirect::to(&state.config().dashboard_url()),
            )
                .into_response()
        }
        Err(err) => {
            error!("Code exchange failed: {err}");
            Redirect::to(&state.config().login_error_url()).into_response()
        }
    }
}
