//! TokenVerifier port - bearer token validation at connection time.
//!
//! The gateway does not mint tokens; it only needs one call that turns a
//! presented bearer token into an [`Identity`] or an error. Any error
//! rejects the connection before a session is created.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Identity};

/// Verifies a bearer token and extracts the caller's identity.
///
/// # Contract
///
/// Implementations must:
/// - Validate the token signature and expiry
/// - Return `AuthError::InvalidToken` for malformed or bad-signature tokens
/// - Return `AuthError::TokenExpired` for expired tokens
/// - Return `AuthError::UnknownRole` when the role claim is outside the
///   closed role set
/// - Return `AuthError::ServiceUnavailable` for transient backend errors
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw token (without the `Bearer ` prefix).
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Role, UserId};
    use std::collections::HashMap;
    use std::sync::RwLock;

    struct TableVerifier {
        tokens: RwLock<HashMap<String, Identity>>,
    }

    #[async_trait]
    impl TokenVerifier for TableVerifier {
        async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
            self.tokens
                .read()
                .unwrap()
                .get(token)
                .cloned()
                .ok_or(AuthError::InvalidToken)
        }
    }

    #[tokio::test]
    async fn verifier_returns_identity_for_known_token() {
        let verifier = TableVerifier {
            tokens: RwLock::new(HashMap::from([(
                "good".to_string(),
                Identity::new(
                    UserId::new("d1").unwrap(),
                    Role::Driver,
                    "d1@example.com",
                    None,
                ),
            )])),
        };

        let identity = verifier.verify("good").await.unwrap();
        assert_eq!(identity.role, Role::Driver);
    }

    #[tokio::test]
    async fn verifier_rejects_unknown_token() {
        let verifier = TableVerifier {
            tokens: RwLock::new(HashMap::new()),
        };
        assert!(matches!(
            verifier.verify("bad").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn trait_is_object_safe_and_send_sync() {
        fn _assert_trait_object(_: &dyn TokenVerifier) {}
        fn _assert_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_send_sync::<std::sync::Arc<dyn TokenVerifier>>();
    }
}
