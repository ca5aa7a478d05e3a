/// Per-attempt state of an interactive login
use crate::callback::CallbackOutcome;
use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::oauth::build_auth_url;
use crate::pkce::Pkce;
use chrono::{DateTime, Utc};

/// Everything one authorization attempt needs, from URL to code exchange
///
/// Created fresh for every attempt so a verifier is never reused. It is
/// owned by the attempt; nothing outside the login flow can see it.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub callback_uri: String,
    pub scope: String,
    pub state: String,
    pkce: Pkce,
    pub received_auth_code: Option<String>,
    pub received_state: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// Start an attempt with a fresh PKCE pair and the configured state
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            callback_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
            state: config.state.clone(),
            pkce: Pkce::generate(),
            received_auth_code: None,
            received_state: None,
            created_at: Utc::now(),
        }
    }

    pub fn code_verifier(&self) -> &str {
        self.pkce.code_verifier()
    }

    pub fn code_challenge(&self) -> &str {
        self.pkce.code_challenge()
    }

    /// Authorize URL carrying this attempt's challenge
    pub fn authorization_url(&self, authorization_endpoint: &str) -> String {
        build_auth_url(
            authorization_endpoint,
            &self.client_id,
            &self.callback_uri,
            &self.scope,
            &self.state,
            self.pkce.code_challenge(),
        )
    }

    /// Record the redirect and hand back the code if it may be exchanged
    ///
    /// A provider error wins over everything else. The state must match
    /// what was sent (absent counts as empty) before a code is released.
    pub fn accept(&mut self, outcome: CallbackOutcome) -> Result<String> {
        self.received_auth_code = outcome.code.clone();
        self.received_state = outcome.state.clone();

        if let Some(error) = outcome.error {
            return Err(AuthError::AuthDenied {
                error,
                description: outcome.error_description,
            });
        }

        let received = outcome.state.unwrap_or_default();
        if received != self.state {
            return Err(AuthError::StateMismatch {
                expected: self.state.clone(),
                received,
            });
        }

        outcome
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::AuthExchange("redirect carried no authorization code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(state: &str) -> OAuthConfig {
        OAuthConfig::xero("abc", "http://localhost:8888/callback", "openid").with_state(state)
    }

    fn outcome(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> CallbackOutcome {
        CallbackOutcome {
            code: code.map(String::from),
            state: state.map(String::from),
            error: error.map(String::from),
            error_description: None,
        }
    }

    #[test]
    fn test_each_attempt_gets_a_fresh_verifier() {
        let first = PendingAuthorization::new(&config("S1"));
        let second = PendingAuthorization::new(&config("S1"));
        assert_ne!(first.code_verifier(), second.code_verifier());
    }

    #[test]
    fn test_authorization_url_uses_attempt_challenge() {
        let pending = PendingAuthorization::new(&config("S1"));
        let url = pending.authorization_url("https://login.xero.com/identity/connect/authorize");
        assert!(url.contains(&format!("code_challenge={}", pending.code_challenge())));
        assert!(url.contains("state=S1"));
    }

    #[test]
    fn test_accept_matching_state() {
        let mut pending = PendingAuthorization::new(&config("XYZ"));
        let code = pending.accept(outcome(Some("ABC"), Some("XYZ"), None)).unwrap();
        assert_eq!(code, "ABC");
        assert_eq!(pending.received_auth_code.as_deref(), Some("ABC"));
        assert_eq!(pending.received_state.as_deref(), Some("XYZ"));
    }

    #[test]
    fn test_accept_rejects_state_mismatch() {
        let mut pending = PendingAuthorization::new(&config("S1"));
        let err = pending.accept(outcome(Some("ABC"), Some("S2"), None)).unwrap_err();
        assert!(matches!(
            err,
            AuthError::StateMismatch { ref expected, ref received } if expected == "S1" && received == "S2"
        ));
    }

    #[test]
    fn test_accept_rejects_missing_state_when_one_was_sent() {
        let mut pending = PendingAuthorization::new(&config("S1"));
        let err = pending.accept(outcome(Some("ABC"), None, None)).unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch { .. }));
    }

    #[test]
    fn test_accept_without_configured_state() {
        let mut pending = PendingAuthorization::new(&config(""));
        assert_eq!(pending.accept(outcome(Some("ABC"), None, None)).unwrap(), "ABC");
    }

    #[test]
    fn test_accept_reports_denied_consent() {
        let mut pending = PendingAuthorization::new(&config("S1"));
        let err = pending
            .accept(outcome(None, Some("S1"), Some("access_denied")))
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthDenied { ref error, .. } if error == "access_denied"));
    }
}
