/// Error types for the Xero OAuth 2.0 login and token lifecycle
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to bind callback listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Authorization denied: {error}, description: {description:?}")]
    AuthDenied {
        error: String,
        description: Option<String>,
    },

    #[error("State mismatch: expected {expected:?}, received {received:?}")]
    StateMismatch { expected: String, received: String },

    #[error("No authorization redirect received within {0} seconds")]
    AuthTimeout(u64),

    #[error("Authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Tenant discovery failed: {0}")]
    TenantDiscovery(String),

    #[error("Tenant {0} is not connected")]
    UnknownTenant(uuid::Uuid),

    #[error("Token revocation failed: {0}")]
    Revocation(String),

    #[error("Interactive login cancelled")]
    Cancelled,

    #[error("No token available")]
    NoToken,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    /// Whether repeating the same operation may succeed without any other
    /// change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::AuthTimeout(_)
                | AuthError::AuthExchange(_)
                | AuthError::Refresh(_)
                | AuthError::TenantDiscovery(_)
                | AuthError::Cancelled
        )
    }

    /// Whether the caller should fall back to a full interactive login.
    pub fn requires_interactive_login(&self) -> bool {
        matches!(self, AuthError::Refresh(_) | AuthError::NoToken)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AuthError::AuthTimeout(60).is_retryable());
        assert!(AuthError::TenantDiscovery("503".into()).is_retryable());
        assert!(!AuthError::StateMismatch {
            expected: "S1".into(),
            received: "S2".into(),
        }
        .is_retryable());
        assert!(!AuthError::AuthDenied {
            error: "access_denied".into(),
            description: None,
        }
        .is_retryable());
        assert!(!AuthError::UnknownTenant(uuid::Uuid::nil()).is_retryable());
    }

    #[test]
    fn test_interactive_fallback_classification() {
        assert!(AuthError::Refresh("invalid_grant".into()).requires_interactive_login());
        assert!(AuthError::NoToken.requires_interactive_login());
        assert!(!AuthError::TenantDiscovery("401".into()).requires_interactive_login());
    }
}
