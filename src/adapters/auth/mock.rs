//! Mock token verifier for tests.
//!
//! Implements the `TokenVerifier` port from a token→identity table,
//! avoiding the need for signed tokens in unit and integration tests.
//!
//! # Example
//!
//! ```ignore
//! let verifier = MockTokenVerifier::new()
//!     .with_driver("driver-token", "D1")
//!     .with_admin("admin-token", "A1");
//!
//! assert!(verifier.verify("driver-token").await.is_ok());
//! assert!(verifier.verify("unknown").await.is_err());
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Identity, Role, UserId};
use crate::ports::TokenVerifier;

/// Table-backed verifier. Unknown tokens return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockTokenVerifier {
    tokens: RwLock<HashMap<String, Identity>>,
    /// Optional error returned for every verification (for error paths).
    force_error: RwLock<Option<AuthError>>,
}

impl MockTokenVerifier {
    /// Creates a new empty mock verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valid token mapped to the given identity.
    pub fn with_identity(self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.write().unwrap().insert(token.into(), identity);
        self
    }

    /// Adds a driver identity derived from the user id.
    pub fn with_driver(self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let identity = Identity::new(
            UserId::new(&user_id).unwrap(),
            Role::Driver,
            format!("{user_id}@test.example.com"),
            Some(format!("Driver {user_id}")),
        );
        self.with_identity(token, identity)
    }

    /// Adds an admin identity derived from the user id.
    pub fn with_admin(self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let identity = Identity::new(
            UserId::new(&user_id).unwrap(),
            Role::Admin,
            format!("{user_id}@test.example.com"),
            Some(format!("Admin {user_id}")),
        );
        self.with_identity(token, identity)
    }

    /// Forces every verification to return the given error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Registers a token at runtime.
    pub fn add_token(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().unwrap().insert(token.into(), identity);
    }

    /// Removes a token, making it invalid.
    pub fn remove_token(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

#[async_trait]
impl TokenVerifier for MockTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_identity_for_registered_token() {
        let verifier = MockTokenVerifier::new().with_driver("t1", "D1");

        let identity = verifier.verify("t1").await.unwrap();
        assert_eq!(identity.user_id.as_str(), "D1");
        assert_eq!(identity.role, Role::Driver);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let verifier = MockTokenVerifier::new();
        assert!(matches!(
            verifier.verify("nope").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn forced_error_overrides_table() {
        let verifier = MockTokenVerifier::new()
            .with_admin("t1", "A1")
            .with_error(AuthError::service_unavailable("down"));

        assert!(matches!(
            verifier.verify("t1").await,
            Err(AuthError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn removed_token_stops_verifying() {
        let verifier = MockTokenVerifier::new().with_admin("t1", "A1");
        assert!(verifier.verify("t1").await.is_ok());

        verifier.remove_token("t1");
        assert!(verifier.verify("t1").await.is_err());
    }
}
