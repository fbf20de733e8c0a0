//! Session and trust-boundary API for the trading platform: browser session
//! cookies, admin impersonation and payment webhook crediting.

pub mod api;
pub mod cli;
pub mod identity;

/// User-Agent sent on outbound identity provider requests.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_name_and_version() {
        assert!(APP_USER_AGENT.starts_with("tradeport/"));
        assert_eq!(
            APP_USER_AGENT,
            format!("tradeport/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
