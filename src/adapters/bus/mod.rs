//! Message bus adapters.
//!
//! - [`redis`] - production transport over Redis pub/sub
//! - [`in_memory`] - deterministic in-process broker for tests
//! - [`analytics`] - observability-only consumer on the domain streams

pub mod analytics;
pub mod in_memory;
pub mod redis;

pub use analytics::AnalyticsRecorder;
pub use in_memory::InMemoryMessageBus;
pub use redis::RedisMessageBus;
