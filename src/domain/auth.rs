//! Identity types: credentials, roles and token claims.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error type for authentication and authorization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Access token expired")]
    ExpiredToken,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Role `{0}` is not allowed to perform this action")]
    Forbidden(Role),
}

/// Who a user is to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Analyst,
    Lender,
    Farmer,
}

/// An action gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Predict,
    ViewAnalytics,
    ViewEvaluations,
    ManageModel,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Analyst => "analyst",
            Self::Lender => "lender",
            Self::Farmer => "farmer",
        }
    }

    #[must_use]
    pub fn allows(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Self::Admin => true,
            Self::Analyst => matches!(permission, Predict | ViewAnalytics | ViewEvaluations),
            Self::Lender => matches!(permission, Predict | ViewEvaluations),
            Self::Farmer => matches!(permission, Predict),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "analyst" => Ok(Self::Analyst),
            "lender" => Ok(Self::Lender),
            "farmer" => Ok(Self::Farmer),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// A stored login.
#[derive(Clone)]
pub struct Credential {
    pub username: String,

    /// Argon2id PHC string
    pub password_hash: String,

    pub role: Role,
}

// The hash is not secret in the key sense, but keep it out of logs anyway.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    pub role: Role,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

impl Claims {
    /// Fail with [`AuthError::Forbidden`] unless the role allows `permission`.
    ///
    /// # Errors
    /// Returns `AuthError::Forbidden` when the permission is missing.
    pub fn require(&self, permission: Permission) -> Result<(), AuthError> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(self.role))
        }
    }
}

/// A signed, time-limited bearer token as handed to the client.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
    #[serde(skip)]
    pub claims: Claims,
}

impl AccessToken {
    #[must_use]
    pub fn bearer(token: String, claims: Claims) -> Self {
        Self {
            access_token: token,
            token_type: "bearer",
            claims,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(Role::Admin.allows(Permission::ManageModel));
        assert!(Role::Analyst.allows(Permission::ViewAnalytics));
        assert!(!Role::Analyst.allows(Permission::ManageModel));
        assert!(Role::Lender.allows(Permission::ViewEvaluations));
        assert!(!Role::Lender.allows(Permission::ViewAnalytics));
        assert!(Role::Farmer.allows(Permission::Predict));
        assert!(!Role::Farmer.allows(Permission::ViewEvaluations));
    }

    #[test]
    fn test_claims_require() {
        let claims = Claims {
            sub: "dave".into(),
            role: Role::Farmer,
            iat: 0,
            exp: 1,
        };
        assert!(claims.require(Permission::Predict).is_ok());
        assert_eq!(
            claims.require(Permission::ManageModel),
            Err(AuthError::Forbidden(Role::Farmer))
        );
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Lender".parse::<Role>(), Ok(Role::Lender));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_credential_debug_hides_hash() {
        let cred = Credential {
            username: "alice".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            role: Role::Admin,
        };
        let out = format!("{cred:?}");
        assert!(out.contains("alice"));
        assert!(!out.contains("argon2id"));
    }
}
