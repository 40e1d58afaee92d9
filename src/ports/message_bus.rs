//! MessageBus port - interface to the topic-exchange broker.
//!
//! Delivery is best-effort: publishes are at-most-once and never raise
//! to the caller, and a handler failure dead-letters the message
//! instead of retrying it. Services that need stronger guarantees must
//! layer them on top.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::domain::routing::{Exchange, RoutingKey, TopicPattern};

/// Operational state of the broker connection.
///
/// `Degraded` is sticky: only an explicit reconnect call on the concrete
/// client can promote the bus back to `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusConnectionState {
    Connected,
    Degraded,
}

impl BusConnectionState {
    /// True when bus operations will actually reach the broker.
    pub fn is_connected(&self) -> bool {
        matches!(self, BusConnectionState::Connected)
    }
}

/// Handler for envelopes delivered to a subscribed queue.
///
/// The consumer task turns the result into the acknowledgment decision:
/// `Ok` acknowledges the message, `Err` negatively acknowledges it
/// without requeue (the message is dropped and logged, never retried).
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one delivered envelope.
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Port for publishing to and consuming from the topic-exchange broker.
///
/// Implementations must never panic and never propagate broker failures
/// to callers: every operation degrades to a logged no-op when the
/// broker is unreachable.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Current connection state.
    fn state(&self) -> BusConnectionState;

    /// Wraps `data` in an [`EventEnvelope`] and fire-and-forgets it.
    ///
    /// Returns `false` (and logs) when the bus is degraded or the broker
    /// rejects the write; a failed publish never reaches the caller as
    /// an error.
    async fn publish(&self, exchange: Exchange, routing_key: &RoutingKey, data: JsonValue)
        -> bool;

    /// Binds `queue` to `exchange` for each pattern and starts consuming.
    ///
    /// Duplicate subscribe calls for the same queue/pattern pair are
    /// allowed and deliver to both handlers; deduplication is the
    /// caller's concern, never the bus's. Returns `false` when degraded.
    async fn subscribe(
        &self,
        queue: &str,
        exchange: Exchange,
        patterns: &[TopicPattern],
        handler: Arc<dyn EventHandler>,
    ) -> bool;

    /// Releases broker resources. Idempotent; safe when never connected.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn MessageBus) {}

    #[allow(dead_code)]
    fn assert_handler_object_safe(_: &dyn EventHandler) {}

    #[test]
    fn connection_state_flags() {
        assert!(BusConnectionState::Connected.is_connected());
        assert!(!BusConnectionState::Degraded.is_connected());
    }
}
