pub mod server;

use secrecy::SecretString;

/// Actions the CLI can dispatch.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        identity_url: Option<String>,
        identity_key: Option<SecretString>,
        frontend_url: String,
        cookie_domain: Option<String>,
        webhook_secret: Option<SecretString>,
    },
}
