//! xero-pkce - OAuth 2.0 authorization code flow with PKCE for Xero
//!
//! Runs the interactive login of a desktop or CLI application against the
//! Xero identity service and keeps the resulting tokens usable.
//!
//! # Features
//!
//! - PKCE (RFC 7636, S256) verifier, challenge and state generation
//! - Loopback HTTP listener that receives the authorization redirect
//! - Code exchange, refresh token rotation and revocation
//! - Tenant (organisation) discovery through the connections endpoint
//! - A token lifecycle coordinator deciding between reuse, refresh and a
//!   new interactive login
//!
//! Token persistence is left to the caller: [`TokenSet`](token::TokenSet)
//! is serde-serializable, and the coordinator takes an existing set at
//! start-up.
//!
//! # Example
//!
//! ```no_run
//! use xero_pkce::prelude::*;
//!
//! # async fn run() -> std::result::Result<(), AuthError> {
//! let config = OAuthConfig::xero(
//!     "your-client-id",
//!     "http://localhost:8888/callback",
//!     "openid profile email accounting.transactions offline_access",
//! )
//! .with_random_state();
//!
//! let coordinator = TokenCoordinator::new(config)?;
//! let token = coordinator.initialize(None).await?;
//! println!("Access token valid until {}", token.expires_at_utc);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod callback;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod tenants;
pub mod token;

#[cfg(test)]
mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::browser::{BrowserLauncher, SystemBrowser};
    pub use crate::callback::{CallbackListener, CallbackOutcome};
    pub use crate::config::OAuthConfig;
    pub use crate::coordinator::{StatusEvent, StatusKind, StatusObserver, TokenCoordinator};
    pub use crate::error::{AuthError, Result};
    pub use crate::oauth::{build_auth_url, TokenClient};
    pub use crate::pkce::Pkce;
    pub use crate::session::PendingAuthorization;
    pub use crate::tenants::{Tenant, TenantClient};
    pub use crate::token::{AuthState, ExpiryPolicy, TokenSet};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::test_support::{free_port, http};
    use tokio_util::sync::CancellationToken;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_auth_url_for_default_redirect() {
        let config = OAuthConfig::xero("abc", "http://localhost:8888/callback", "openid");
        let pending = PendingAuthorization::new(&config);
        let url = pending.authorization_url(&config.authorization_endpoint);

        assert!(url.starts_with("https://login.xero.com/identity/connect/authorize?"));
        assert!(url.contains("client_id=abc"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8888%2Fcallback"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(!url.contains("state="));
    }

    /// Drives each component by hand, the way the coordinator does
    #[tokio::test]
    async fn test_full_oauth_flow() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/connect/token"))
            .and(matchers::body_string_contains("code=ABC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "expires_in": 1800
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/connections"))
            .and(matchers::header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let port = free_port();
        let config = OAuthConfig::xero(
            "abc",
            &format!("http://127.0.0.1:{}/callback", port),
            "openid offline_access",
        )
        .with_endpoints_base(&server.uri())
        .with_state("XYZ")
        .with_timeout(5);

        let mut pending = PendingAuthorization::new(&config);
        let listener = CallbackListener::new();
        listener.start(&config.redirect_uri).await.unwrap();

        let redirect = format!("{}?code=ABC&state=XYZ", config.redirect_uri);
        let browser = tokio::spawn(async move { http().get(redirect).send().await });

        let outcome = listener
            .wait(config.timeout(), &CancellationToken::new())
            .await
            .unwrap();
        listener.stop().await;
        assert_eq!(browser.await.unwrap().unwrap().status(), 200);

        let code = pending.accept(outcome).unwrap();
        let tokens = TokenClient::new(http(), &config);
        let token = tokens
            .exchange_code(&code, &pending.callback_uri, pending.code_verifier())
            .await
            .unwrap();
        assert_eq!(token.access_token, "access");

        let tenants = TenantClient::new(http(), config.connections_endpoint.clone())
            .list_tenants(&token.access_token)
            .await
            .unwrap();
        assert!(tenants.is_empty());
    }
}
