//! Analytics tap on the domain event streams.
//!
//! Binds the `gateway_analytics` queue to the `user.*`, `task.*` and
//! `location.*` families purely for observability. It is an independent
//! consumer sharing the bus client; it never touches the notification
//! delivery path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::domain::routing::{queues, Exchange, TopicPattern};
use crate::ports::{EventHandler, MessageBus};

/// Logs every observed domain event and counts them.
pub struct AnalyticsRecorder {
    observed: AtomicU64,
}

impl AnalyticsRecorder {
    pub fn new() -> Self {
        Self {
            observed: AtomicU64::new(0),
        }
    }

    /// Creates as an Arc ready to hand to the bus.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of events observed so far.
    pub fn observed_count(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    /// Registers the analytics bindings on the bus.
    ///
    /// One binding per exchange family; each returns independently so a
    /// degraded bus just leaves analytics dark.
    pub async fn register(self: &Arc<Self>, bus: &dyn MessageBus) {
        let families = [
            (Exchange::Users, TopicPattern::family("user")),
            (Exchange::Tasks, TopicPattern::family("task")),
            (Exchange::Locations, TopicPattern::family("location")),
        ];

        for (exchange, pattern) in families {
            bus.subscribe(
                queues::GATEWAY_ANALYTICS,
                exchange,
                &[pattern],
                Arc::clone(self) as Arc<dyn EventHandler>,
            )
            .await;
        }
    }
}

impl Default for AnalyticsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for AnalyticsRecorder {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.observed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.id,
            source = %event.source,
            "analytics: domain event observed"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "AnalyticsRecorder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::bus::InMemoryMessageBus;
    use crate::domain::routing::RoutingKey;
    use serde_json::json;

    #[tokio::test]
    async fn records_events_from_all_three_families() {
        let bus = InMemoryMessageBus::new("test");
        let recorder = AnalyticsRecorder::new_shared();
        recorder.register(&bus).await;

        bus.publish(Exchange::Users, &RoutingKey::user("created"), json!({}))
            .await;
        bus.publish(Exchange::Tasks, &RoutingKey::task("updated"), json!({}))
            .await;
        bus.publish(Exchange::Locations, &RoutingKey::location("updated"), json!({}))
            .await;
        // Auth events are not tapped.
        bus.publish(Exchange::Auth, &RoutingKey::auth("login"), json!({}))
            .await;

        assert_eq!(recorder.observed_count(), 3);
    }

    #[tokio::test]
    async fn handler_never_fails() {
        let recorder = AnalyticsRecorder::new();
        let event = EventEnvelope::new("user.created", json!({"id": "u1"}), "user-service");
        assert!(recorder.handle(event).await.is_ok());
    }
}
