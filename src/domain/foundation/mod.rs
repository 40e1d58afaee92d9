//! Foundation value objects shared across the domain.
//!
//! - Identifiers ([`UserId`], [`ConnectionId`], [`EventId`])
//! - Time ([`Timestamp`])
//! - Identity ([`Identity`], [`Role`], [`AuthError`])
//! - Events ([`EventEnvelope`])
//! - Errors ([`DomainError`], [`ErrorCode`], [`ValidationError`])

mod auth;
mod errors;
mod events;
mod ids;
mod timestamp;

pub use auth::{AuthError, Identity, Role};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{EventEnvelope, EventId};
pub use ids::{ConnectionId, UserId};
pub use timestamp::Timestamp;
