//! Auth subsystem configuration

use serde::{Deserialize, Serialize};
use sp_types::Role;
use std::time::Duration;

/// Provider endpoints and flow tuning.
///
/// The defaults point at Twitch; the endpoint fields exist so tests can aim
/// the exchange client at a local stub. The per-role callback ports are not
/// configurable: they are registered with the provider (see [`Role`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_validate_url")]
    pub validate_url: String,

    #[serde(default = "default_revoke_url")]
    pub revoke_url: String,

    /// Seconds a login may wait for the browser redirect before timing out
    #[serde(default = "default_flow_timeout_secs")]
    pub flow_timeout_secs: u64,

    /// Seconds before expiry at which a stored token is refreshed proactively
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    /// Ask the provider to re-prompt for consent on every login
    #[serde(default = "default_force_verify")]
    pub force_verify: bool,

    /// Open the authorization URL in the default browser automatically
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_authorize_url() -> String {
    "https://id.twitch.tv/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_validate_url() -> String {
    "https://id.twitch.tv/oauth2/validate".to_string()
}

fn default_revoke_url() -> String {
    "https://id.twitch.tv/oauth2/revoke".to_string()
}

fn default_flow_timeout_secs() -> u64 {
    300
}

fn default_refresh_margin_secs() -> u64 {
    300
}

fn default_force_verify() -> bool {
    true
}

fn default_open_browser() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            validate_url: default_validate_url(),
            revoke_url: default_revoke_url(),
            flow_timeout_secs: default_flow_timeout_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            force_verify: default_force_verify(),
            open_browser: default_open_browser(),
        }
    }
}

impl AuthConfig {
    pub fn flow_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_timeout_secs)
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_margin_secs as i64)
    }

    /// Redirect URI for a role. Must match what is registered with the
    /// provider byte-for-byte, in both the authorization URL and the code
    /// exchange.
    pub fn redirect_uri(&self, role: Role) -> String {
        format!("http://localhost:{}/", role.callback_port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_twitch() {
        let config = AuthConfig::default();
        assert!(config.authorize_url.starts_with("https://id.twitch.tv/"));
        assert!(config.token_url.starts_with("https://id.twitch.tv/"));
        assert_eq!(config.flow_timeout_secs, 300);
        assert_eq!(config.refresh_margin_secs, 300);
        assert!(config.force_verify);
    }

    #[test]
    fn test_redirect_uri_uses_role_port() {
        let config = AuthConfig::default();
        assert_eq!(
            config.redirect_uri(Role::Broadcaster),
            "http://localhost:17563/"
        );
        assert_eq!(config.redirect_uri(Role::Bot), "http://localhost:17564/");
    }

    #[test]
    fn test_empty_config_deserializes_to_defaults() {
        let config: AuthConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.token_url, AuthConfig::default().token_url);
        assert!(config.open_browser);
    }
}
