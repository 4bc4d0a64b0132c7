//! Stateless access tokens.
//!
//! Tokens are compact JWS strings (`header.claims.signature`, base64url
//! without padding) signed with Ed25519 (`alg = EdDSA`). Nothing is stored
//! server-side: a token is valid iff its signature verifies under the
//! server key and it has not expired.
//!
//! # Memory Security
//!
//! [`TokenKey`] zeroizes its seed on drop and never prints it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::auth::{AccessToken, AuthError, Claims, Role};

const HEADER_ALG: &str = "EdDSA";
const HEADER_TYP: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Server-held token signing key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenKey {
    seed: [u8; 32],

    /// Key fingerprint for identification (NOT secret)
    #[zeroize(skip)]
    pub fingerprint: String,
}

impl TokenKey {
    /// Build a key from a 32-byte Ed25519 seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let verifying = SigningKey::from_bytes(&seed).verifying_key();
        Self {
            seed,
            fingerprint: compute_fingerprint(verifying.as_bytes()),
        }
    }

    /// Generate a fresh random key (used when no key is configured in debug builds).
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let key = Self::from_seed(seed);
        seed.zeroize();
        key
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.seed)
    }

    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key().verifying_key()
    }

    /// Issue a token for `subject` valid for `ttl_secs` from `now`.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` if the claims cannot be encoded.
    pub fn issue(&self, subject: &str, role: Role, now: i64, ttl_secs: i64) -> Result<AccessToken, AuthError> {
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };
        let header = Header {
            alg: HEADER_ALG.to_string(),
            typ: HEADER_TYP.to_string(),
        };

        let header_b64 = encode_segment(&header)?;
        let claims_b64 = encode_segment(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature: Signature = self.signing_key().sign(signing_input.as_bytes());
        let token = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()));

        Ok(AccessToken::bearer(token, claims))
    }

    /// Verify a token's signature and expiry at time `now`.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` on any structural or signature
    /// failure and `AuthError::ExpiredToken` once `now >= exp`.
    pub fn verify(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let mut parts = token.trim().split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != HEADER_ALG {
            return Err(AuthError::InvalidToken);
        }

        let sig_bytes: [u8; 64] = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AuthError::InvalidToken)?
            .try_into()
            .map_err(|_| AuthError::InvalidToken)?;
        let signature = Signature::from_bytes(&sig_bytes);

        let signing_input = format!("{header_b64}.{claims_b64}");
        self.verifying_key()
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let claims: Claims = decode_segment(claims_b64)?;
        if now >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|_| AuthError::InvalidToken)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}

/// First 8 bytes of SHA-256 over the public key, hex encoded.
fn compute_fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes)[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000;

    #[test]
    fn test_issue_verify_roundtrip() {
        let key = TokenKey::generate();
        let token = key.issue("alice", Role::Analyst, NOW, 3600).expect("Should issue");
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.access_token.split('.').count(), 3);

        let claims = key.verify(&token.access_token, NOW + 10).expect("Should verify");
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::Analyst);
        assert_eq!(claims.exp, NOW + 3600);
    }

    #[test]
    fn test_expired_token() {
        let key = TokenKey::generate();
        let token = key.issue("alice", Role::Admin, NOW, 60).expect("Should issue");
        assert_eq!(key.verify(&token.access_token, NOW + 60), Err(AuthError::ExpiredToken));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let token = TokenKey::generate()
            .issue("alice", Role::Admin, NOW, 60)
            .expect("Should issue");
        let other = TokenKey::generate();
        assert_eq!(other.verify(&token.access_token, NOW), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let key = TokenKey::generate();
        let token = key.issue("dave", Role::Farmer, NOW, 60).expect("Should issue");
        let parts: Vec<&str> = token.access_token.split('.').collect();

        let forged = Claims {
            sub: "dave".into(),
            role: Role::Admin,
            iat: NOW,
            exp: NOW + 60,
        };
        let forged_b64 = encode_segment(&forged).expect("encode");
        let forged_token = format!("{}.{}.{}", parts[0], forged_b64, parts[2]);
        assert_eq!(key.verify(&forged_token, NOW), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage_rejected() {
        let key = TokenKey::generate();
        for t in ["", "a.b", "a.b.c.d", "not.a.token"] {
            assert_eq!(key.verify(t, NOW), Err(AuthError::InvalidToken), "token {t:?}");
        }
    }

    #[test]
    fn test_key_debug_no_leak() {
        let key = TokenKey::from_seed([7u8; 32]);
        let out = format!("{key:?}");
        assert!(out.contains("fingerprint"));
        assert!(!out.contains("seed"));
        assert_eq!(key.fingerprint.len(), 16);
    }
}
