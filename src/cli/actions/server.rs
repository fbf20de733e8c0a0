use crate::api;
use crate::api::AuthConfig;
use crate::cli::actions::Action;
use crate::identity::IdentityConfig;
use anyhow::{anyhow, Result};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            identity_url,
            identity_key,
            frontend_url,
            cookie_domain,
            webhook_secret,
        } => {
            let identity_config = IdentityConfig::new(identity_url, identity_key);

            // Fail before any client is constructed or any network call made.
            if !identity_config.is_configured() {
                return Err(anyhow!(
                    "identity provider is not configured: set --identity-url and --identity-key"
                ));
            }

            let auth_config = AuthConfig::new(frontend_url).with_cookie_domain(cookie_domain);

            api::new(port, dsn, identity_config, auth_config, webhook_secret).await?;
        }
    }

    Ok(())
}
