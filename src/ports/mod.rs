//! Ports - interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the notification fabric and the outside world. Adapters implement them.
//!
//! - `MessageBus` / `EventHandler` - topic-exchange broker access
//! - `TokenVerifier` - bearer token validation at connection time

mod message_bus;
mod token_verifier;

pub use message_bus::{BusConnectionState, EventHandler, MessageBus};
pub use token_verifier::TokenVerifier;
