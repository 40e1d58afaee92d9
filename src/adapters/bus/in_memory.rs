//! In-memory message bus for tests.
//!
//! Provides synchronous, deterministic delivery: a publish invokes every
//! matching binding's handler before returning, so tests never need to
//! wait for a consumer task. Also records published and dead-lettered
//! envelopes for assertions.
//!
//! # Security Note
//!
//! This adapter is for **testing only**. It uses lock-poisoning recovery
//! that is fine for test code; production deployments use the Redis bus
//! adapter.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::foundation::EventEnvelope;
use crate::domain::routing::{Exchange, RoutingKey, TopicPattern};
use crate::ports::{BusConnectionState, EventHandler, MessageBus};

struct Binding {
    queue: String,
    exchange: Exchange,
    pattern: TopicPattern,
    handler: Arc<dyn EventHandler>,
}

/// Deterministic in-process topic broker.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryMessageBus::new("test-service"));
/// bus.subscribe("task_events", Exchange::Tasks, &[TopicPattern::family("task")], handler).await;
/// bus.publish(Exchange::Tasks, &RoutingKey::task("created"), json!({"id": 7})).await;
/// assert_eq!(bus.event_count(), 1);
/// ```
pub struct InMemoryMessageBus {
    service_name: String,
    state: RwLock<BusConnectionState>,
    bindings: RwLock<Vec<Binding>>,
    published: RwLock<Vec<(Exchange, EventEnvelope)>>,
    dead_letters: RwLock<Vec<EventEnvelope>>,
}

impl InMemoryMessageBus {
    /// Creates a connected bus stamping envelopes with `service_name`.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: RwLock::new(BusConnectionState::Connected),
            bindings: RwLock::new(Vec::new()),
            published: RwLock::new(Vec::new()),
            dead_letters: RwLock::new(Vec::new()),
        }
    }

    /// Creates a bus that starts in degraded mode (handshake failed).
    pub fn degraded(service_name: impl Into<String>) -> Self {
        let bus = Self::new(service_name);
        bus.set_state(BusConnectionState::Degraded);
        bus
    }

    /// Forces the connection state, simulating broker loss or recovery.
    pub fn set_state(&self, state: BusConnectionState) {
        *self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    // === Test Helpers ===

    /// All published envelopes with their exchange, in publish order.
    pub fn published_events(&self) -> Vec<(Exchange, EventEnvelope)> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Published envelopes with the given routing key.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|(_, e)| e.event_type == event_type)
            .map(|(_, e)| e)
            .collect()
    }

    /// Envelopes whose handler failed and were dropped.
    pub fn dead_letters(&self) -> Vec<EventEnvelope> {
        self.dead_letters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count of published envelopes.
    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when at least one envelope with this routing key was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(_, e)| e.event_type == event_type)
    }

    /// Clears recorded envelopes (for test isolation).
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.dead_letters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    fn state(&self) -> BusConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish(
        &self,
        exchange: Exchange,
        routing_key: &RoutingKey,
        data: JsonValue,
    ) -> bool {
        if !self.state().is_connected() {
            tracing::warn!(routing_key = %routing_key, "bus degraded, dropping publish");
            return false;
        }

        let envelope = EventEnvelope::new(routing_key.as_str(), data, self.service_name.clone());
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((exchange, envelope.clone()));

        // Clone matching handlers out so no lock is held across an await.
        let matching: Vec<(String, Arc<dyn EventHandler>)> = {
            let bindings = self
                .bindings
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            bindings
                .iter()
                .filter(|b| b.exchange == exchange && b.pattern.matches(routing_key.as_str()))
                .map(|b| (b.queue.clone(), Arc::clone(&b.handler)))
                .collect()
        };

        for (queue, handler) in matching {
            if let Err(err) = handler.handle(envelope.clone()).await {
                tracing::warn!(
                    queue = %queue,
                    handler = handler.name(),
                    event_id = %envelope.id,
                    error = %err,
                    "handler failed, dead-lettering message"
                );
                self.dead_letters
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(envelope.clone());
            }
        }

        true
    }

    async fn subscribe(
        &self,
        queue: &str,
        exchange: Exchange,
        patterns: &[TopicPattern],
        handler: Arc<dyn EventHandler>,
    ) -> bool {
        if !self.state().is_connected() {
            tracing::warn!(queue, "bus degraded, cannot subscribe");
            return false;
        }

        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for pattern in patterns {
            bindings.push(Binding {
                queue: queue.to_string(),
                exchange,
                pattern: pattern.clone(),
                handler: Arc::clone(&handler),
            });
        }
        true
    }

    async fn close(&self) {
        self.set_state(BusConnectionState::Degraded);
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{DomainError, ErrorCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::HandlerFailed, "boom"))
        }
        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    #[tokio::test]
    async fn publish_records_envelope_with_source() {
        let bus = InMemoryMessageBus::new("task-service");

        assert!(
            bus.publish(Exchange::Tasks, &RoutingKey::task("created"), json!({"id": 1}))
                .await
        );

        assert_eq!(bus.event_count(), 1);
        let (exchange, envelope) = &bus.published_events()[0];
        assert_eq!(*exchange, Exchange::Tasks);
        assert_eq!(envelope.event_type, "task.created");
        assert_eq!(envelope.source, "task-service");
    }

    #[tokio::test]
    async fn matching_handler_invoked_exactly_once_with_published_payload() {
        let bus = InMemoryMessageBus::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let payload = Arc::new(RwLock::new(JsonValue::Null));

        struct CaptureHandler(Arc<AtomicUsize>, Arc<RwLock<JsonValue>>);

        #[async_trait]
        impl EventHandler for CaptureHandler {
            async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                *self.1.write().unwrap() = event.data;
                Ok(())
            }
            fn name(&self) -> &'static str {
                "CaptureHandler"
            }
        }

        bus.subscribe(
            "task_events",
            Exchange::Tasks,
            &[TopicPattern::family("task")],
            Arc::new(CaptureHandler(count.clone(), payload.clone())),
        )
        .await;

        let data = json!({"title": "Deliver parcel", "priority": 2});
        bus.publish(Exchange::Tasks, &RoutingKey::task("created"), data.clone())
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*payload.read().unwrap(), data);
    }

    #[tokio::test]
    async fn publish_while_degraded_returns_false() {
        let bus = InMemoryMessageBus::degraded("test");

        let ok = bus
            .publish(Exchange::Tasks, &RoutingKey::task("created"), json!({}))
            .await;

        assert!(!ok);
        assert_eq!(bus.event_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_while_degraded_returns_false() {
        let bus = InMemoryMessageBus::degraded("test");
        let count = Arc::new(AtomicUsize::new(0));

        let ok = bus
            .subscribe(
                "task_events",
                Exchange::Tasks,
                &[TopicPattern::family("task")],
                Arc::new(CountingHandler(count)),
            )
            .await;

        assert!(!ok);
    }

    #[tokio::test]
    async fn duplicate_bindings_deliver_to_both_handlers() {
        let bus = InMemoryMessageBus::new("test");
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            bus.subscribe(
                "task_events",
                Exchange::Tasks,
                &[TopicPattern::family("task")],
                Arc::new(CountingHandler(count.clone())),
            )
            .await;
        }

        bus.publish(Exchange::Tasks, &RoutingKey::task("created"), json!({}))
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_matching_exchange_not_delivered() {
        let bus = InMemoryMessageBus::new("test");
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            "task_events",
            Exchange::Tasks,
            &[TopicPattern::family("task")],
            Arc::new(CountingHandler(count.clone())),
        )
        .await;

        // Same pattern family name, different exchange: must not deliver.
        bus.publish(Exchange::Users, &RoutingKey::new("task.created").unwrap(), json!({}))
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_handler_dead_letters_message() {
        let bus = InMemoryMessageBus::new("test");

        bus.subscribe(
            "task_events",
            Exchange::Tasks,
            &[TopicPattern::family("task")],
            Arc::new(FailingHandler),
        )
        .await;

        // Publish still succeeds: handler failure is the consumer's loss.
        assert!(
            bus.publish(Exchange::Tasks, &RoutingKey::task("created"), json!({}))
                .await
        );

        assert_eq!(bus.dead_letters().len(), 1);
        assert_eq!(bus.dead_letters()[0].event_type, "task.created");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_degrades() {
        let bus = InMemoryMessageBus::new("test");
        bus.close().await;
        bus.close().await;
        assert_eq!(bus.state(), BusConnectionState::Degraded);
    }

    #[tokio::test]
    async fn events_of_type_filters_by_routing_key() {
        let bus = InMemoryMessageBus::new("test");
        bus.publish(Exchange::Tasks, &RoutingKey::task("created"), json!({}))
            .await;
        bus.publish(Exchange::Tasks, &RoutingKey::task("deleted"), json!({}))
            .await;
        bus.publish(Exchange::Users, &RoutingKey::user("created"), json!({}))
            .await;

        assert_eq!(bus.events_of_type("task.created").len(), 1);
        assert!(bus.has_event("user.created"));
        assert!(!bus.has_event("location.updated"));
    }
}
