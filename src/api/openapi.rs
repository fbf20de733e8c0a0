//! OpenAPI document for the service.

use utoipa::OpenApi;

use super::handlers::{auth, health, webhook};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::session::session,
        auth::session::logout,
        auth::impersonate::impersonate,
        webhook::payment,
    ),
    components(schemas(
        health::Health,
        auth::types::ImpersonateRequest,
        auth::types::SessionResponse,
        webhook::PaymentNotification,
    )),
    tags(
        (name = "auth", description = "Session and impersonation endpoints"),
        (name = "webhooks", description = "Payment provider notifications"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|path| *path == "/v1/auth/session"));
        assert!(paths.iter().any(|path| *path == "/v1/auth/impersonate"));
        assert!(paths.iter().any(|path| *path == "/v1/webhooks/payment"));
        assert!(paths.iter().any(|path| *path == "/health"));

        // Decimal-bearing webhook body must make it into the components.
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|components| components.schemas.contains_key("PaymentNotification")));
    }
}
