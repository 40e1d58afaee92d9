//! JWT token verification adapter.
//!
//! Verifies HS256 tokens minted by the external auth service against the
//! shared secret. The gateway never mints tokens; it only checks the
//! signature and expiry and maps the claims onto an [`Identity`].

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::{AuthError, Identity, Role, UserId};
use crate::ports::TokenVerifier;

/// Claims carried by the auth service's access tokens.
#[derive(Debug, Deserialize)]
struct Claims {
    id: String,
    email: String,
    role: String,
    #[serde(default)]
    name: Option<String>,
    #[allow(dead_code)]
    exp: u64,
}

/// Shared-secret HS256 token verifier.
pub struct JwtTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    /// Creates a verifier for the given shared secret.
    pub fn new(secret: &SecretString) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            decoding_key,
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
                match err.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken,
                }
            })?;

        let claims = data.claims;
        let role =
            Role::parse(&claims.role).ok_or_else(|| AuthError::UnknownRole(claims.role.clone()))?;
        let user_id = UserId::new(claims.id).map_err(|_| AuthError::InvalidToken)?;

        Ok(Identity::new(user_id, role, claims.email, claims.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        id: &'a str,
        email: &'a str,
        role: &'a str,
        name: Option<&'a str>,
        exp: i64,
    }

    const SECRET: &str = "test-signing-secret";

    fn sign(claims: &TestClaims<'_>, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verifier() -> JwtTokenVerifier {
        JwtTokenVerifier::new(&SecretString::new(SECRET.to_string()))
    }

    fn future_exp() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn valid_driver_token_yields_identity() {
        let token = sign(
            &TestClaims {
                id: "driver-7",
                email: "driver7@example.com",
                role: "driver",
                name: Some("Dana Driver"),
                exp: future_exp(),
            },
            SECRET,
        );

        let identity = verifier().verify(&token).await.unwrap();
        assert_eq!(identity.user_id.as_str(), "driver-7");
        assert_eq!(identity.role, Role::Driver);
        assert_eq!(identity.display_name_or_email(), "Dana Driver");
    }

    #[tokio::test]
    async fn valid_admin_token_yields_admin_role() {
        let token = sign(
            &TestClaims {
                id: "admin-1",
                email: "ops@example.com",
                role: "admin",
                name: None,
                exp: future_exp(),
            },
            SECRET,
        );

        let identity = verifier().verify(&token).await.unwrap();
        assert!(identity.is_admin());
        assert_eq!(identity.display_name_or_email(), "ops@example.com");
    }

    #[tokio::test]
    async fn expired_token_is_rejected_as_expired() {
        let token = sign(
            &TestClaims {
                id: "u1",
                email: "u1@example.com",
                role: "driver",
                name: None,
                // Far enough in the past to clear the default leeway.
                exp: Utc::now().timestamp() - 3600,
            },
            SECRET,
        );

        assert!(matches!(
            verifier().verify(&token).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected_as_invalid() {
        let token = sign(
            &TestClaims {
                id: "u1",
                email: "u1@example.com",
                role: "driver",
                name: None,
                exp: future_exp(),
            },
            "some-other-secret",
        );

        assert!(matches!(
            verifier().verify(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected_explicitly() {
        let token = sign(
            &TestClaims {
                id: "u1",
                email: "u1@example.com",
                role: "dispatcher",
                name: None,
                exp: future_exp(),
            },
            SECRET,
        );

        match verifier().verify(&token).await {
            Err(AuthError::UnknownRole(role)) => assert_eq!(role, "dispatcher"),
            other => panic!("expected UnknownRole, got {:?}", other.map(|i| i.role)),
        }
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_as_invalid() {
        assert!(matches!(
            verifier().verify("not.a.jwt").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
