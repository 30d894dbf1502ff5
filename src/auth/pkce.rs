//! PKCE (Proof Key for Code Exchange) utilities for OAuth2
//!
//! Implements RFC 7636 for secure authorization code exchange.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes behind the code verifier (43 characters once encoded)
const VERIFIER_BYTES: usize = 32;

/// Random bytes behind `state` and `nonce`
const STATE_BYTES: usize = 8;

/// Base64url (unpadded) encoding of `len` cryptographically random bytes
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a code challenge from the code verifier
///
/// Uses S256 method: BASE64URL(SHA256(code_verifier))
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(hash)
}

/// Challenge material for one login attempt
///
/// Created when the attempt starts and consumed by the single callback that
/// answers it.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub verifier: String,
    /// Anti-CSRF token echoed back by the provider
    pub state: String,
    /// Replay protection for the identity token
    pub nonce: String,
    /// Port of the loopback server waiting for the reply
    pub callback_port: u16,
}

impl AuthChallenge {
    pub fn new(callback_port: u16) -> Self {
        Self {
            verifier: random_token(VERIFIER_BYTES),
            state: random_token(STATE_BYTES),
            nonce: random_token(STATE_BYTES),
            callback_port,
        }
    }

    /// The S256 challenge sent with the authorization request
    pub fn code_challenge(&self) -> String {
        generate_code_challenge(&self.verifier)
    }

    /// Redirect target registered for this attempt
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.callback_port)
    }
}

/// Loopback redirect URI for a callback port
pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_base64url(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_verifier_length() {
        let challenge = AuthChallenge::new(1234);
        assert!(challenge.verifier.len() >= 43 && challenge.verifier.len() <= 128);
        assert_eq!(challenge.verifier.len(), 43);
        assert!(is_base64url(&challenge.verifier));
    }

    #[test]
    fn test_state_and_nonce_format() {
        let challenge = AuthChallenge::new(1234);
        // 8 bytes encode to 11 unpadded characters
        assert_eq!(challenge.state.len(), 11);
        assert_eq!(challenge.nonce.len(), 11);
        assert!(is_base64url(&challenge.state));
        assert!(is_base64url(&challenge.nonce));
    }

    #[test]
    fn test_code_challenge_known_vector() {
        // RFC 7636 appendix B
        let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_challenge_matches_verifier() {
        let challenge = AuthChallenge::new(1);
        assert_eq!(challenge.code_challenge(), generate_code_challenge(&challenge.verifier));
        assert_eq!(challenge.code_challenge().len(), 43);
    }

    #[test]
    fn test_challenges_are_unique() {
        let a = AuthChallenge::new(1);
        let b = AuthChallenge::new(1);
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn test_redirect_uri() {
        assert_eq!(AuthChallenge::new(8085).redirect_uri(), "http://127.0.0.1:8085");
    }
}
