/// Provider endpoints and login settings
use crate::error::{AuthError, Result};
use crate::pkce;
use crate::token::ExpiryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const XERO_AUTHORIZATION_ENDPOINT: &str = "https://login.xero.com/identity/connect/authorize";
pub const XERO_TOKEN_ENDPOINT: &str = "https://identity.xero.com/connect/token";
pub const XERO_REVOCATION_ENDPOINT: &str = "https://identity.xero.com/connect/revocation";
pub const XERO_CONNECTIONS_ENDPOINT: &str = "https://api.xero.com/connections";

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_REFRESH_WINDOW_SECONDS: i64 = 300;
/// Xero drops unused refresh tokens after 60 days; one day of slack.
const DEFAULT_REFRESH_TOKEN_LIFETIME_DAYS: i64 = 59;
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// OAuth 2.0 configuration
///
/// Read-only to the login machinery. Callers own loading and persisting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Loopback URI the listener binds, e.g. `http://localhost:8888/callback`
    pub redirect_uri: String,
    /// Space separated; include `offline_access` to receive refresh tokens
    pub scope: String,
    /// Sent only when non-empty
    #[serde(default)]
    pub state: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_revocation_endpoint")]
    pub revocation_endpoint: String,
    #[serde(default = "default_connections_endpoint")]
    pub connections_endpoint: String,
    #[serde(default = "default_refresh_window_seconds")]
    pub refresh_window_seconds: i64,
    #[serde(default = "default_refresh_token_lifetime_days")]
    pub refresh_token_lifetime_days: i64,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

impl OAuthConfig {
    /// Configuration preset for Xero's identity service
    ///
    /// # Example
    ///
    /// ```
    /// use xero_pkce::config::OAuthConfig;
    ///
    /// let config = OAuthConfig::xero(
    ///     "your-client-id",
    ///     "http://localhost:8888/callback",
    ///     "openid profile email accounting.transactions offline_access",
    /// );
    /// assert_eq!(config.timeout_seconds, 60);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn xero(client_id: &str, redirect_uri: &str, scope: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            state: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            authorization_endpoint: XERO_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: XERO_TOKEN_ENDPOINT.to_string(),
            revocation_endpoint: XERO_REVOCATION_ENDPOINT.to_string(),
            connections_endpoint: XERO_CONNECTIONS_ENDPOINT.to_string(),
            refresh_window_seconds: DEFAULT_REFRESH_WINDOW_SECONDS,
            refresh_token_lifetime_days: DEFAULT_REFRESH_TOKEN_LIFETIME_DAYS,
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
        }
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = state.to_string();
        self
    }

    /// Use a freshly generated random state value
    pub fn with_random_state(self) -> Self {
        let state = pkce::generate_state();
        self.with_state(&state)
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Point every provider endpoint at one base URL
    ///
    /// Paths mirror the real provider: `/identity/connect/authorize`,
    /// `/connect/token`, `/connect/revocation` and `/connections`.
    pub fn with_endpoints_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorization_endpoint = format!("{}/identity/connect/authorize", base);
        self.token_endpoint = format!("{}/connect/token", base);
        self.revocation_endpoint = format!("{}/connect/revocation", base);
        self.connections_endpoint = format!("{}/connections", base);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Refresh thresholds, rejecting negative or unrepresentable values
    pub fn expiry_policy(&self) -> Result<ExpiryPolicy> {
        let refresh_window = Some(self.refresh_window_seconds)
            .filter(|seconds| *seconds >= 0)
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                AuthError::InvalidConfig(format!(
                    "refresh_window_seconds out of range: {}",
                    self.refresh_window_seconds
                ))
            })?;
        let refresh_token_lifetime = Some(self.refresh_token_lifetime_days)
            .filter(|days| *days >= 0)
            .and_then(chrono::Duration::try_days)
            .ok_or_else(|| {
                AuthError::InvalidConfig(format!(
                    "refresh_token_lifetime_days out of range: {}",
                    self.refresh_token_lifetime_days
                ))
            })?;

        Ok(ExpiryPolicy {
            refresh_window,
            refresh_token_lifetime,
        })
    }

    /// Reject settings the login flow cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfig("client_id is empty".into()));
        }

        let redirect = Url::parse(&self.redirect_uri).map_err(|e| {
            AuthError::InvalidConfig(format!("redirect_uri {:?}: {}", self.redirect_uri, e))
        })?;
        if redirect.scheme() != "http" {
            return Err(AuthError::InvalidConfig(format!(
                "redirect_uri must use http for a loopback listener, got {}",
                redirect.scheme()
            )));
        }
        if redirect.host_str().map_or(true, str::is_empty) {
            return Err(AuthError::InvalidConfig(
                "redirect_uri has no host".into(),
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(AuthError::InvalidConfig(
                "timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(AuthError::InvalidConfig(
                "http_timeout_seconds must be greater than zero".into(),
            ));
        }
        self.expiry_policy()?;

        for endpoint in [
            &self.authorization_endpoint,
            &self.token_endpoint,
            &self.revocation_endpoint,
            &self.connections_endpoint,
        ] {
            Url::parse(endpoint).map_err(|e| {
                AuthError::InvalidConfig(format!("endpoint {:?}: {}", endpoint, e))
            })?;
        }

        Ok(())
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_authorization_endpoint() -> String {
    XERO_AUTHORIZATION_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    XERO_TOKEN_ENDPOINT.to_string()
}

fn default_revocation_endpoint() -> String {
    XERO_REVOCATION_ENDPOINT.to_string()
}

fn default_connections_endpoint() -> String {
    XERO_CONNECTIONS_ENDPOINT.to_string()
}

fn default_refresh_window_seconds() -> i64 {
    DEFAULT_REFRESH_WINDOW_SECONDS
}

fn default_refresh_token_lifetime_days() -> i64 {
    DEFAULT_REFRESH_TOKEN_LIFETIME_DAYS
}

fn default_http_timeout_seconds() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xero_preset() {
        let config = OAuthConfig::xero("abc", "http://localhost:8888/callback", "openid");
        assert_eq!(config.authorization_endpoint, XERO_AUTHORIZATION_ENDPOINT);
        assert_eq!(config.token_endpoint, XERO_TOKEN_ENDPOINT);
        assert_eq!(config.connections_endpoint, XERO_CONNECTIONS_ENDPOINT);
        assert_eq!(config.refresh_token_lifetime_days, 59);
        assert!(config.state.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = r#"{
            "client_id": "abc",
            "redirect_uri": "http://localhost:8888/callback",
            "scope": "openid offline_access"
        }"#;
        let config: OAuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout_seconds, 60);
        assert_eq!(config.refresh_window_seconds, 300);
        assert_eq!(config.token_endpoint, XERO_TOKEN_ENDPOINT);
        assert_eq!(config.state, "");
    }

    #[test]
    fn test_endpoints_base() {
        let config = OAuthConfig::xero("abc", "http://localhost:8888/callback", "openid")
            .with_endpoints_base("http://127.0.0.1:9999/");
        assert_eq!(config.token_endpoint, "http://127.0.0.1:9999/connect/token");
        assert_eq!(config.connections_endpoint, "http://127.0.0.1:9999/connections");
    }

    #[test]
    fn test_random_state() {
        let config =
            OAuthConfig::xero("abc", "http://localhost:8888/callback", "openid").with_random_state();
        assert_eq!(config.state.len(), 32);
    }

    #[test]
    fn test_validation_failures() {
        let base = OAuthConfig::xero("abc", "http://localhost:8888/callback", "openid");

        let mut config = base.clone();
        config.client_id = " ".into();
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let mut config = base.clone();
        config.redirect_uri = "not a url".into();
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let mut config = base.clone();
        config.redirect_uri = "https://localhost:8888/callback".into();
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let mut config = base.clone();
        config.http_timeout_seconds = 0;
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let mut config = base.clone();
        config.refresh_token_lifetime_days = i64::MAX;
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));
        assert!(config.expiry_policy().is_err());

        let mut config = base.clone();
        config.refresh_token_lifetime_days = -1;
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let mut config = base.clone();
        config.refresh_window_seconds = i64::MIN;
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));

        let config = base.with_timeout(0);
        assert!(matches!(config.validate(), Err(AuthError::InvalidConfig(_))));
    }
}
