//! Adapters - implementations of port interfaces.
//!
//! - `auth` - token verification (JWT, mock)
//! - `bus` - message bus transports (Redis, in-memory) and analytics tap
//! - `websocket` - sessions, rooms, notification routing, transport

pub mod auth;
pub mod bus;
pub mod websocket;

pub use auth::{JwtTokenVerifier, MockTokenVerifier};
pub use bus::{AnalyticsRecorder, InMemoryMessageBus, RedisMessageBus};
