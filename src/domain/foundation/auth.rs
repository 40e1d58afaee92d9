//! Identity types for authenticated connections.
//!
//! These types represent a user extracted from a verified bearer token.
//! They have no provider dependencies: any token backend can populate them
//! through the `TokenVerifier` port.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::UserId;

/// Role of an authenticated user.
///
/// A closed set: a token carrying any other role string fails
/// verification at the connection gate. Room capabilities and push
/// targeting branch on this enum, never on raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Driver,
}

impl Role {
    /// Returns the wire representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Driver => "driver",
        }
    }

    /// Parses a role from its token claim value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "driver" => Some(Role::Driver),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The unique user identifier from the auth provider.
    pub user_id: UserId,

    /// The user's role, controlling room membership and capabilities.
    pub role: Role,

    /// User's email address from the token claims.
    pub email: String,

    /// Display name if the token carries one.
    pub display_name: Option<String>,
}

impl Identity {
    /// Creates a new identity.
    pub fn new(
        user_id: UserId,
        role: Role,
        email: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            user_id,
            role,
            email: email.into(),
            display_name,
        }
    }

    /// Returns the display name, or email as fallback.
    pub fn display_name_or_email(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }

    /// True when the identity may receive the admin dashboard feed.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the identity is a driver with a personal location room.
    pub fn is_driver(&self) -> bool {
        self.role == Role::Driver
    }
}

/// Authentication errors surfaced at connection time.
///
/// Any of these rejects the connection before a session exists; the
/// client must retry with fresh credentials.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired (separate from InvalidToken for specific handling).
    #[error("Token expired")]
    TokenExpired,

    /// The token is valid but carries a role outside the closed set.
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// The verification backend is unavailable (network, config, etc.).
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if the client should re-authenticate before retrying.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken | AuthError::TokenExpired | AuthError::UnknownRole(_)
        )
    }
}
