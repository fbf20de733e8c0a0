//! HTTP client for the identity provider.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

use super::{AuthEvent, AuthUser, Error, IdentityProvider, Session, TokenPair};

const SERVICE_KEY_HEADER: &str = "x-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection settings for the identity provider.
///
/// Both fields must be present before a client can be built; the gate is
/// checked at construction time, never mid-request.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    base_url: Option<String>,
    service_key: Option<SecretString>,
}

impl IdentityConfig {
    #[must_use]
    pub fn new(base_url: Option<String>, service_key: Option<SecretString>) -> Self {
        Self {
            base_url,
            service_key,
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.base_url.as_ref().is_some_and(|url| !url.is_empty()) && self.service_key.is_some()
    }
}

pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: Url,
    service_key: SecretString,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpIdentityProvider {
    /// Build a provider client.
    ///
    /// # Errors
    /// Returns [`Error::Unconfigured`] when the URL or service key is unset,
    /// before any network call is attempted.
    pub fn new(config: &IdentityConfig) -> Result<Self, Error> {
        if !config.is_configured() {
            return Err(Error::Unconfigured);
        }
        let base_url = config
            .base_url
            .as_deref()
            .and_then(|url| Url::parse(url).ok())
            .ok_or(Error::Unconfigured)?;
        let service_key = config.service_key.clone().ok_or(Error::Unconfigured)?;

        let http = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| Error::Upstream(err.to_string()))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            base_url,
            service_key,
            events,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(|_| Error::Payload)
    }

    /// Fetch the user bound to an access token. `Ok(None)` when the token is
    /// expired or revoked.
    async fn fetch_user(&self, access_token: &str) -> Result<Option<AuthUser>, Error> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .http
            .get(url)
            .header(SERVICE_KEY_HEADER, self.service_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| Error::Upstream(err.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let user = response
                    .json::<AuthUser>()
                    .await
                    .map_err(|_| Error::Payload)?;
                Ok(Some(user))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => Ok(None),
            status => Err(Error::Upstream(format!("user lookup returned {status}"))),
        }
    }

    /// Rotate an expired pair via the refresh grant. `Ok(None)` when the
    /// refresh token itself is no longer valid.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<Session>, Error> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.set_query(Some("grant_type=refresh_token"));
        let response = self
            .http
            .post(url)
            .header(SERVICE_KEY_HEADER, self.service_key.expose_secret())
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|err| Error::Upstream(err.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let session = response
                    .json::<Session>()
                    .await
                    .map_err(|_| Error::Payload)?;
                Ok(Some(session))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => Ok(None),
            status => Err(Error::Upstream(format!("token refresh returned {status}"))),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_session(&self, tokens: &TokenPair) -> Result<Option<Session>, Error> {
        if let Some(user) = self.fetch_user(&tokens.access_token).await? {
            return Ok(Some(Session {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                expires_at: None,
                user,
            }));
        }

        // Access token no longer valid; honor the renewal obligation.
        match self.refresh(&tokens.refresh_token).await? {
            Some(session) => {
                debug!(user_id = %session.user.id, "Rotated session tokens");
                let _ = self.events.send(AuthEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn set_session(&self, tokens: &TokenPair) -> Result<Session, Error> {
        // The stored pair may be stale; accept either a live access token or
        // a refreshable pair, reject anything else.
        let session = if let Some(user) = self.fetch_user(&tokens.access_token).await? {
            Session {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                expires_at: None,
                user,
            }
        } else {
            self.refresh(&tokens.refresh_token)
                .await?
                .ok_or(Error::Rejected)?
        };

        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, Error> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.set_query(Some("grant_type=authorization_code"));
        let response = self
            .http
            .post(url)
            .header(SERVICE_KEY_HEADER, self.service_key.expose_secret())
            .json(&serde_json::json!({ "auth_code": code }))
            .send()
            .await
            .map_err(|err| Error::Upstream(err.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let session = response
                    .json::<Session>()
                    .await
                    .map_err(|_| Error::Payload)?;
                let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
                Ok(session)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                Err(Error::Rejected)
            }
            status => Err(Error::Upstream(format!("code exchange returned {status}"))),
        }
    }

    async fn sign_out(&self, tokens: &TokenPair) -> Result<(), Error> {
        let url = self.endpoint("auth/v1/logout")?;
        let result = self
            .http
            .post(url)
            .header(SERVICE_KEY_HEADER, self.service_key.expose_secret())
            .bearer_auth(&tokens.access_token)
            .send()
            .await;

        // Logout is advisory; the cookie overwrite is what ends the session
        // locally, so a provider miss is only worth a debug line.
        if let Err(err) = result {
            debug!("Provider logout failed: {err}");
        }
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_when_fields_missing() {
        let config = IdentityConfig::new(None, None);
        assert!(!config.is_configured());
        assert!(matches!(
            HttpIdentityProvider::new(&config),
            Err(Error::Unconfigured)
        ));

        let config = IdentityConfig::new(Some("https://id.example.com".to_string()), None);
        assert!(!config.is_configured());

        let config = IdentityConfig::new(None, Some(SecretString::from("key".to_string())));
        assert!(!config.is_configured());
    }

    #[test]
    fn configured_client_builds_without_network() {
        let config = IdentityConfig::new(
            Some("https://id.example.com".to_string()),
            Some(SecretString::from("service-key".to_string())),
        );
        assert!(config.is_configured());
        let provider = HttpIdentityProvider::new(&config).expect("client should build");
        assert_eq!(
            provider.endpoint("auth/v1/user").unwrap().as_str(),
            "https://id.example.com/auth/v1/user"
        );
    }

    #[test]
    fn empty_url_counts_as_unconfigured() {
        let config = IdentityConfig::new(
            Some(String::new()),
            Some(SecretString::from("key".to_string())),
        );
        assert!(!config.is_configured());
    }
}
