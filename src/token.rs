/// Token set model and expiry classification
use crate::tenants::Tenant;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Credentials obtained from the token endpoint plus the tenants they reach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub id_token: String,
    pub expires_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub tenants: Vec<Tenant>,
}

impl TokenSet {
    /// Check if the access token is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at_utc
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Seconds left on the access token, negative once expired
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at_utc - Utc::now()).num_seconds()
    }
}

/// Where a coordinator stands in the token lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    NoToken,
    TokenValid,
    /// Access token expired or inside the refresh window, refresh token usable
    TokenExpiringSoon,
    /// Refresh token presumed dead; only an interactive login helps
    TokenHardExpired,
    AwaitingInteractiveAuth,
    Failed,
}

/// Thresholds driving [`classify`]
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    /// Refresh this long before `expires_at_utc`
    pub refresh_window: Duration,
    /// Refresh tokens are treated as dead this long after the access token expired
    pub refresh_token_lifetime: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            refresh_window: Duration::seconds(300),
            refresh_token_lifetime: Duration::days(59),
        }
    }
}

/// Decide what a stored token needs at `now`
///
/// A token without a refresh token counts as no token at all: once its
/// access token lapses nothing can renew it.
pub fn classify(token: Option<&TokenSet>, now: DateTime<Utc>, policy: &ExpiryPolicy) -> AuthState {
    let token = match token {
        Some(token) if !token.refresh_token.is_empty() => token,
        _ => return AuthState::NoToken,
    };

    // Past the last representable date a bound can never be crossed; before
    // the first one it always has been.
    let hard_expired = token
        .expires_at_utc
        .checked_add_signed(policy.refresh_token_lifetime)
        .map_or(false, |dead_at| now > dead_at);
    let inside_window = token
        .expires_at_utc
        .checked_sub_signed(policy.refresh_window)
        .map_or(true, |refresh_at| now >= refresh_at);

    if hard_expired {
        AuthState::TokenHardExpired
    } else if inside_window {
        AuthState::TokenExpiringSoon
    } else {
        AuthState::TokenValid
    }
}
