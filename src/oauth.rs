/// Authorization URL construction and token endpoint calls
use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::pkce::Pkce;
use crate::token::TokenSet;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::form_urlencoded;

/// Shared HTTP client for the token and connections endpoints
pub fn http_client(config: &OAuthConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AuthError::InvalidConfig(format!("HTTP client: {}", e)))
}

/// Compose the browser-facing authorize URL
///
/// `state` is appended only when non-empty. Every value is percent-encoded.
///
/// # Example
///
/// ```
/// use xero_pkce::oauth::build_auth_url;
///
/// let url = build_auth_url(
///     "https://login.xero.com/identity/connect/authorize",
///     "abc",
///     "http://localhost:8888/callback",
///     "openid",
///     "",
///     "challenge",
/// );
/// assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8888%2Fcallback"));
/// assert!(!url.contains("state="));
/// ```
pub fn build_auth_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
    code_challenge: &str,
) -> String {
    let separator = if authorization_endpoint.contains('?') {
        '&'
    } else {
        '?'
    };

    let mut url = format!(
        "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method={}",
        authorization_endpoint,
        separator,
        encode(client_id),
        encode(redirect_uri),
        encode(scope),
        encode(code_challenge),
        Pkce::code_challenge_method()
    );

    if !state.is_empty() {
        url.push_str(&format!("&state={}", encode(state)));
    }

    url
}

fn encode(value: &str) -> String {
    // form encoding writes spaces as '+' and a literal '+' as %2B
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Client for the token and revocation endpoints
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    client_id: String,
    token_endpoint: String,
    revocation_endpoint: String,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            token_endpoint: config.token_endpoint.clone(),
            revocation_endpoint: config.revocation_endpoint.clone(),
        }
    }

    /// Exchange an authorization code and its PKCE verifier for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let token = self
            .post_token_form(&form)
            .await
            .map_err(AuthError::AuthExchange)?;

        info!(expires_at = %token.expires_at_utc, "Exchanged authorization code");
        Ok(token)
    }

    /// Trade a refresh token for a new token set
    ///
    /// The provider rotates refresh tokens: the one passed in is dead once
    /// this succeeds, and the returned set carries its replacement.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        let mut token = self
            .post_token_form(&form)
            .await
            .map_err(AuthError::Refresh)?;

        if token.refresh_token.is_empty() {
            warn!("Refresh response carried no refresh_token, keeping the previous one");
            token.refresh_token = refresh_token.to_string();
        }

        info!(expires_at = %token.expires_at_utc, "Refreshed access token");
        Ok(token)
    }

    /// Revoke a refresh token and every access token issued from it
    pub async fn revoke_token(&self, refresh_token: &str) -> Result<()> {
        let form = [
            ("token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];

        let response = self
            .http
            .post(&self.revocation_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Revocation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Revocation(describe_failure(status, &body)));
        }

        info!("Revoked refresh token");
        Ok(())
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> std::result::Result<TokenSet, String> {
        debug!(endpoint = %self.token_endpoint, grant_type = form[0].1, "Calling token endpoint");

        let response = self
            .http
            .post(&self.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            return Err(describe_failure(status, &body));
        }

        parse_token_response(&body, Utc::now())
    }
}

/// Build a token set from a token endpoint body received at `now`
fn parse_token_response(body: &str, now: DateTime<Utc>) -> std::result::Result<TokenSet, String> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed token response: {}", e))?;

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token response has no access_token".to_string())?;

    let expires_in = match &response.expires_in {
        Some(value) => parse_expires_in(value)
            .ok_or_else(|| format!("token response has non-numeric expires_in {}", value))?,
        None => return Err("token response has no expires_in".to_string()),
    };

    let expires_at_utc = Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| format!("token response has out-of-range expires_in {}", expires_in))?;

    Ok(TokenSet {
        access_token,
        refresh_token: response.refresh_token.unwrap_or_default(),
        id_token: response.id_token.unwrap_or_default(),
        expires_at_utc,
        tenants: Vec::new(),
    })
}

fn parse_expires_in(value: &serde_json::Value) -> Option<i64> {
    let seconds = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (seconds >= 0).then_some(seconds)
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            error_description: Some(description),
        }) => format!("{}: {} ({})", status, error, description),
        Ok(ErrorResponse { error, .. }) => format!("{}: {}", status, error),
        Err(_) => format!("{}", status),
    }
}
