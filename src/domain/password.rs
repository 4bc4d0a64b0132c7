//! Argon2id password hashing for stored credentials.
//!
//! Hashes are stored as PHC strings, so parameters travel with each hash
//! and can be raised later without invalidating existing users.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Stored password hash is malformed")]
    MalformedHash,

    #[error("Password must not be empty")]
    Empty,
}

fn argon2() -> Result<Argon2<'static>, PasswordError> {
    // 46 MiB, 1 pass, 1 lane (OWASP minimum for Argon2id).
    let params = Params::new(47104, 1, 1, None)
        .map_err(|e| PasswordError::Hashing(format!("Invalid Argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with a fresh random salt.
///
/// # Errors
/// Returns error if the password is empty or hashing fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Empty);
    }
    let salt = SaltString::generate(&mut OsRng);
    argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Check a password against a stored PHC hash.
///
/// # Errors
/// Returns `PasswordError::MalformedHash` if the stored hash cannot be parsed.
pub fn verify_password(password: &str, phc: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(phc).map_err(|_| PasswordError::MalformedHash)?;
    Ok(argon2()?
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Burn the same work as a real verification when the user does not exist,
/// so response timing does not reveal which usernames are registered.
pub fn verify_against_dummy(password: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY.get_or_init(|| hash_password("agricredit-dummy-password").ok());
    if let Some(phc) = dummy {
        let _ = verify_password(password, phc);
    }
}
