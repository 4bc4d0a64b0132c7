//! Credential store port: persisted logins.

use crate::domain::Credential;

/// Storage for user credentials.
///
/// Registration is done out of band (see the `add_user` tool); the service
/// itself only reads.
pub trait CredentialStore: Send + Sync {
    /// Error type for credential operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Look up a credential by username.
    ///
    /// # Returns
    /// `None` if no such user exists.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn find_credential(&self, username: &str) -> Result<Option<Credential>, Self::Error>;

    /// Insert a new credential. Existing usernames are rejected.
    ///
    /// # Errors
    /// Returns error if the username exists or storage fails.
    fn insert_credential(&self, credential: &Credential) -> Result<(), Self::Error>;

    /// Remove a credential (account removal).
    ///
    /// # Returns
    /// Whether a credential was removed.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn delete_credential(&self, username: &str) -> Result<bool, Self::Error>;
}
