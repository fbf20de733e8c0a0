//! Cookie session adapter: bridges the HTTP transport to the session store.
//!
//! One jar exists per request/response pair. Reads come from the request
//! `Cookie` header; writes accumulate and are applied as `Set-Cookie`
//! response headers. Removal has no primitive of its own: it is an
//! overwrite with an empty value and zero max-age.

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
use base64ct::{Base64UrlUnpadded, Encoding};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::identity::TokenPair;

pub const SESSION_COOKIE_NAME: &str = "tradeport_session";

/// Attributes applied to written cookies.
#[derive(Clone, Debug)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }
}

/// Whether the current call site may mutate response cookies. Render-only
/// contexts are `Frozen`: writes there are dropped, not propagated, because
/// a session-refresh side effect must never fail page delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePhase {
    Mutable,
    Frozen,
}

/// Per-request cookie jar.
pub struct CookieJar {
    incoming: HashMap<String, String>,
    outgoing: Vec<(String, String, CookieOptions)>,
    phase: WritePhase,
    dropped_writes: Arc<AtomicU64>,
}

impl CookieJar {
    #[must_use]
    pub fn from_headers(
        headers: &HeaderMap,
        phase: WritePhase,
        dropped_writes: Arc<AtomicU64>,
    ) -> Self {
        Self {
            incoming: parse_cookie_header(headers),
            outgoing: Vec::new(),
            phase,
            dropped_writes,
        }
    }

    /// Read a cookie, observing any overwrite already staged in this jar.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some((_, value, options)) = self
            .outgoing
            .iter()
            .rev()
            .find(|(staged, _, _)| staged == name)
        {
            if value.is_empty() && options.max_age == Some(0) {
                return None;
            }
            return Some(value.as_str());
        }
        self.incoming.get(name).map(String::as_str)
    }

    /// Stage a cookie write. In the frozen phase the write is logged,
    /// counted, and dropped; the session is then only as fresh as the last
    /// successfully written cookie.
    pub fn set(&mut self, name: &str, value: &str, options: CookieOptions) {
        if self.phase == WritePhase::Frozen {
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping cookie write for {name}: response phase is frozen");
            return;
        }
        self.outgoing
            .push((name.to_string(), value.to_string(), options));
    }

    /// Remove a cookie. This is an overwrite, not a delete: empty value,
    /// zero max-age. Callers must not assume a distinct delete operation.
    pub fn remove(&mut self, name: &str, options: CookieOptions) {
        self.set(name, "", options.with_max_age(0));
    }

    /// Response headers carrying the staged writes.
    #[must_use]
    pub fn into_response_headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value, options) in &self.outgoing {
            match HeaderValue::from_str(&format_set_cookie(name, value, options)) {
                Ok(header) => {
                    headers.append(SET_COOKIE, header);
                }
                Err(err) => warn!("Skipping unencodable cookie {name}: {err}"),
            }
        }
        headers
    }

    #[must_use]
    pub fn dropped_write_count(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }
}

fn parse_cookie_header(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    let Some(header) = headers.get(axum::http::header::COOKIE) else {
        return cookies;
    };
    let Ok(value) = header.to_str() else {
        return cookies;
    };
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let Some(key) = parts.next().map(str::trim) else {
            continue;
        };
        let Some(val) = parts.next().map(str::trim) else {
            continue;
        };
        if !key.is_empty() {
            cookies.insert(key.to_string(), val.to_string());
        }
    }
    cookies
}

fn format_set_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path={}", options.path);
    if let Some(domain) = &options.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if let Some(max_age) = options.max_age {
        cookie.push_str("; Max-Age=");
        cookie.push_str(&max_age.to_string());
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    cookie.push_str("; SameSite=");
    cookie.push_str(options.same_site.as_str());
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Encode the cached token pair into a cookie-safe value.
pub(crate) fn encode_session_cookie(tokens: &TokenPair) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_vec(tokens)?;
    Ok(Base64UrlUnpadded::encode_string(&payload))
}

/// Decode a cookie value back into a token pair. Garbage decodes to `None`
/// (treated as an anonymous visitor, never an error).
pub(crate) fn decode_session_cookie(value: &str) -> Option<TokenPair> {
    let payload = Base64UrlUnpadded::decode_vec(value).ok()?;
    serde_json::from_slice(&payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    fn jar_with(headers: &HeaderMap, phase: WritePhase) -> CookieJar {
        CookieJar::from_headers(headers, phase, Arc::new(AtomicU64::new(0)))
    }

    #[test]
    fn reads_cookies_from_request_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; tradeport_session=x"));
        let jar = jar_with(&headers, WritePhase::Mutable);
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get(SESSION_COOKIE_NAME), Some("x"));
        assert_eq!(jar.get("missing"), None);
    }

    #[test]
    fn staged_write_overrides_incoming_value() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1"));
        let mut jar = jar_with(&headers, WritePhase::Mutable);
        jar.set("a", "2", CookieOptions::default());
        assert_eq!(jar.get("a"), Some("2"));
    }

    #[test]
    fn remove_is_set_with_empty_value_and_zero_max_age() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1"));
        let mut jar = jar_with(&headers, WritePhase::Mutable);
        jar.remove("a", CookieOptions::default());

        // Observationally equivalent to deletion.
        assert_eq!(jar.get("a"), None);

        let headers = jar.into_response_headers();
        let set_cookie = headers
            .get(SET_COOKIE)
            .and_then(|header| header.to_str().ok())
            .expect("set-cookie header");
        assert!(set_cookie.starts_with("a=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[test]
    fn frozen_jar_drops_writes_and_counts_them() {
        let counter = Arc::new(AtomicU64::new(0));
        let headers = HeaderMap::new();
        let mut jar = CookieJar::from_headers(&headers, WritePhase::Frozen, counter.clone());

        jar.set("a", "1", CookieOptions::default());
        jar.remove("b", CookieOptions::default());

        assert_eq!(jar.get("a"), None);
        assert_eq!(jar.dropped_write_count(), 2);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert!(jar.into_response_headers().is_empty());
    }

    #[test]
    fn set_cookie_format_includes_attributes() {
        let options = CookieOptions::default()
            .with_max_age(3600)
            .with_secure(true)
            .with_domain(Some("app.example.com".to_string()));
        let cookie = format_set_cookie("s", "v", &options);
        assert_eq!(
            cookie,
            "s=v; Path=/; Domain=app.example.com; Max-Age=3600; HttpOnly; SameSite=Lax; Secure"
        );
    }

    #[test]
    fn session_cookie_round_trips() {
        let tokens = TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        };
        let encoded = encode_session_cookie(&tokens).expect("encode");
        assert_eq!(decode_session_cookie(&encoded), Some(tokens));
        assert_eq!(decode_session_cookie("not-base64!"), None);
    }
}
