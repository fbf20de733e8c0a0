//! Router assembly and server lifecycle.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use handlers::auth::{AuthConfig, AuthState, PgProfileStore};
pub use handlers::webhook::{PgDepositLedger, WebhookState};
pub use openapi::ApiDoc;

use crate::identity::{context::AuthContext, HttpIdentityProvider, IdentityConfig, IdentityProvider};

/// Start the server.
///
/// Building the identity client is the configuration gate: an unset provider
/// URL or key fails here, before any network call or request handling.
///
/// # Errors
/// Returns an error if configuration is incomplete, the database is
/// unreachable, or the listener cannot bind.
pub async fn new(
    port: u16,
    dsn: String,
    identity_config: IdentityConfig,
    auth_config: AuthConfig,
    webhook_secret: Option<SecretString>,
) -> Result<()> {
    let identity: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::new(&identity_config)?);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let auth_state = Arc::new(AuthState::new(
        auth_config,
        identity.clone(),
        Arc::new(PgProfileStore::new(pool.clone())),
    ));
    let webhook_state = Arc::new(WebhookState::new(
        Arc::new(PgDepositLedger::new(pool.clone())),
        webhook_secret,
    ));

    // Single owner for the auth-state mirror: spawned here, torn down after
    // the server exits.
    let auth_context = AuthContext::spawn(identity, None);

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(handlers::root))
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .route("/v1/auth/session", get(handlers::auth::session::session))
        .route("/v1/auth/logout", post(handlers::auth::session::logout))
        .route("/v1/auth/callback", get(handlers::auth::session::callback))
        .route(
            "/v1/auth/impersonate",
            post(handlers::auth::impersonate::impersonate),
        )
        .route(
            "/v1/webhooks/payment",
            post(handlers::webhook::payment),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(webhook_state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    auth_context.shutdown().await;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
