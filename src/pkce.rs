/// PKCE (Proof Key for Code Exchange) implementation
/// RFC 7636: https://tools.ietf.org/html/rfc7636
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Verifier and challenge for a single authorization attempt
#[derive(Debug, Clone)]
pub struct Pkce {
    code_verifier: String,
    code_challenge: String,
}

impl Pkce {
    /// Generate a new PKCE challenge pair
    ///
    /// Creates a fresh cryptographically secure code verifier and derives
    /// the code challenge from it. Every call yields a new verifier, so a
    /// pair must never be shared between two authorization attempts.
    ///
    /// # Examples
    ///
    /// ```
    /// use xero_pkce::pkce::Pkce;
    ///
    /// let pkce = Pkce::generate();
    /// assert_eq!(Pkce::code_challenge_method(), "S256");
    /// assert_eq!(pkce.code_verifier().len(), 43);
    /// ```
    pub fn generate() -> Self {
        Self::from_verifier(generate_code_verifier())
    }

    /// Rebuild a pair from a known verifier
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = derive_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    /// Get the code challenge method (always S256)
    pub fn code_challenge_method() -> &'static str {
        "S256"
    }
}

/// 32 random bytes, base64url encoded without padding (43 characters)
pub fn generate_code_verifier() -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// SHA-256 of the verifier's UTF-8 bytes, base64url encoded without padding
pub fn derive_code_challenge(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random anti-CSRF state value (16 bytes, lowercase hex)
pub fn generate_state() -> String {
    let state_bytes: [u8; 16] = rand::thread_rng().gen();
    state_bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
