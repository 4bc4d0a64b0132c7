//! Auth gateway: password login and bearer token checks.

use std::sync::Arc;

use crate::domain::{password, AccessToken, AuthError, Claims, Credential, Role, TokenKey};
use crate::ports::CredentialStore;
use crate::AgricreditError;

/// Issues and checks stateless access tokens.
///
/// Login is CPU-heavy (Argon2id); async callers should run it on a
/// blocking thread.
pub struct AuthGateway<C>
where
    C: CredentialStore,
{
    store: Arc<C>,
    key: TokenKey,
    ttl_secs: i64,
}

impl<C> AuthGateway<C>
where
    C: CredentialStore,
    C::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new auth gateway.
    pub fn new(store: Arc<C>, key: TokenKey, ttl_secs: i64) -> Self {
        tracing::info!("Token signing key fingerprint: {}", key.fingerprint);
        Self {
            store,
            key,
            ttl_secs,
        }
    }

    /// Exchange a username and password for an access token.
    ///
    /// Unknown users and wrong passwords fail identically, after the same
    /// amount of hashing work.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCredentials` on mismatch, or a persistence
    /// error if the store cannot be read.
    pub fn login(&self, username: &str, password: &str) -> Result<AccessToken, AgricreditError> {
        self.login_at(username, password, chrono::Utc::now().timestamp())
    }

    fn login_at(&self, username: &str, password: &str, now: i64) -> Result<AccessToken, AgricreditError> {
        let credential = self
            .store
            .find_credential(username.trim())
            .map_err(|e| AgricreditError::Persistence(e.into()))?;

        let Some(credential) = credential else {
            password::verify_against_dummy(password);
            tracing::info!("Login rejected: unknown user");
            return Err(AuthError::InvalidCredentials.into());
        };

        if !password::verify_password(password, &credential.password_hash)? {
            tracing::info!("Login rejected for {}: wrong password", credential.username);
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self
            .key
            .issue(&credential.username, credential.role, now, self.ttl_secs)?;
        tracing::info!("Issued token for {} ({})", credential.username, credential.role);
        Ok(token)
    }

    /// Verify a bearer token and return its claims.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` or `AuthError::ExpiredToken`.
    pub fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        self.key.verify(token, chrono::Utc::now().timestamp())
    }

    /// Hash and store a new credential.
    ///
    /// # Errors
    /// Returns error if the password is empty, the user exists, or storage fails.
    pub fn register(&self, username: &str, password: &str, role: Role) -> Result<(), AgricreditError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidCredentials.into());
        }
        let credential = Credential {
            username: username.to_string(),
            password_hash: password::hash_password(password)?,
            role,
        };
        self.store
            .insert_credential(&credential)
            .map_err(|e| AgricreditError::Persistence(e.into()))
    }

    #[must_use]
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStorage;
    use crate::domain::Permission;

    const NOW: i64 = 1_750_000_000;

    fn gateway() -> AuthGateway<SqliteStorage> {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let gateway = AuthGateway::new(storage, TokenKey::generate(), 3600);
        gateway
            .register("alice", "correct-password", Role::Analyst)
            .expect("Should register");
        gateway
    }

    #[test]
    fn test_login_success() {
        let gateway = gateway();
        let token = gateway
            .login_at("alice", "correct-password", NOW)
            .expect("Should login");
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.claims.exp - token.claims.iat, 3600);

        let claims = gateway.key.verify(&token.access_token, NOW + 1).expect("Should verify");
        assert_eq!(claims.sub, "alice");
        assert!(claims.require(Permission::ViewAnalytics).is_ok());
    }

    #[test]
    fn test_wrong_password() {
        let gateway = gateway();
        let err = gateway.login("alice", "wrong").expect_err("Should reject");
        assert!(matches!(err, AgricreditError::Auth(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_unknown_user() {
        let gateway = gateway();
        let err = gateway.login("mallory", "anything").expect_err("Should reject");
        assert!(matches!(err, AgricreditError::Auth(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_live_token_authenticates() {
        let gateway = gateway();
        let token = gateway.login("alice", "correct-password").expect("Should login");
        let claims = gateway.authenticate(&token.access_token).expect("Should authenticate");
        assert_eq!(claims.role, Role::Analyst);
    }

    #[test]
    fn test_expired_token() {
        let gateway = gateway();
        let token = gateway
            .login_at("alice", "correct-password", NOW - 7200)
            .expect("Should login");
        assert_eq!(
            gateway.authenticate(&token.access_token),
            Err(AuthError::ExpiredToken)
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let gateway = gateway();
        let err = gateway
            .register("alice", "other", Role::Admin)
            .expect_err("Should reject");
        assert!(matches!(err, AgricreditError::Persistence(_)));
    }
}
