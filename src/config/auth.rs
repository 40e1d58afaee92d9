//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Minimum length accepted for the JWT shared secret in production.
const MIN_SECRET_LEN: usize = 16;

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret the auth service signs HS256 tokens with
    pub jwt_secret: SecretString,
}

impl AuthConfig {
    /// Validate auth configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH_JWT_SECRET"));
        }
        if production && secret.len() < MIN_SECRET_LEN {
            return Err(ValidationError::WeakJwtSecret(MIN_SECRET_LEN));
        }
        Ok(())
    }
}
