//! Redis-backed message bus adapter.
//!
//! Maps the topic-exchange model onto Redis pub/sub:
//!
//! - a routing key published to exchange `dispatch.tasks` becomes a
//!   `PUBLISH` on channel `dispatch.tasks:task.created`;
//! - a queue binding becomes a `PSUBSCRIBE` on `dispatch.tasks:task.*`,
//!   with a dedicated consumer task applying the ack/nack decision from
//!   the handler result.
//!
//! Redis glob patterns are wider than topic patterns (`task.*` glob also
//! matches `task.created.retry`), so the consumer re-checks every
//! delivery against [`TopicPattern::matches`] before dispatching.
//!
//! The adapter never raises broker failures to callers. A failed
//! handshake leaves the bus in degraded mode where every operation is a
//! logged no-op; only an explicit [`RedisMessageBus::reconnect`] call
//! promotes it back.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::domain::foundation::EventEnvelope;
use crate::domain::routing::{Exchange, RoutingKey, TopicPattern};
use crate::ports::{BusConnectionState, EventHandler, MessageBus};

/// Production message bus client over Redis pub/sub.
///
/// One publish connection is shared by the whole process and serialized
/// behind a mutex; each subscription owns its own pub/sub connection and
/// consumer task.
pub struct RedisMessageBus {
    service_name: String,
    client: Option<redis::Client>,
    publish_conn: Mutex<Option<MultiplexedConnection>>,
    state: RwLock<BusConnectionState>,
    consumers: StdMutex<Vec<JoinHandle<()>>>,
}

impl RedisMessageBus {
    /// Attempts a single broker handshake.
    ///
    /// Never fails the caller: on any error the client starts in degraded
    /// mode and all bus operations become safe no-ops until
    /// [`RedisMessageBus::reconnect`] succeeds.
    pub async fn connect(url: &str, service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        tracing::info!(url, "connecting to message broker");

        let client = match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "invalid broker URL, continuing in degraded mode");
                None
            }
        };

        let bus = Self {
            service_name,
            client,
            publish_conn: Mutex::new(None),
            state: RwLock::new(BusConnectionState::Degraded),
            consumers: StdMutex::new(Vec::new()),
        };
        bus.handshake().await;
        bus
    }

    /// Explicitly re-attempts the broker handshake.
    ///
    /// This is the only path from `Degraded` back to `Connected`.
    /// Subscriptions started while previously connected keep their own
    /// pub/sub connections; reconnect restores publishing and the ability
    /// to register new subscriptions.
    pub async fn reconnect(&self) -> BusConnectionState {
        self.handshake().await;
        self.state()
    }

    async fn handshake(&self) {
        let Some(client) = &self.client else {
            return;
        };

        match client.get_multiplexed_tokio_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
                Ok(_) => {
                    *self.publish_conn.lock().await = Some(conn);
                    self.set_state(BusConnectionState::Connected);
                    tracing::info!(
                        exchanges = ?Exchange::ALL.map(|e| e.as_str()),
                        "message bus connected"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "broker handshake failed, continuing in degraded mode");
                    self.set_state(BusConnectionState::Degraded);
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "broker unreachable, continuing in degraded mode");
                self.set_state(BusConnectionState::Degraded);
            }
        }
    }

    fn set_state(&self, state: BusConnectionState) {
        *self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn channel(exchange: Exchange, routing_key: &str) -> String {
        format!("{}:{}", exchange.as_str(), routing_key)
    }
}

#[async_trait]
impl MessageBus for RedisMessageBus {
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
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize envelope");
                return false;
            }
        };

        let channel = Self::channel(exchange, routing_key.as_str());
        let mut guard = self.publish_conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            tracing::warn!(routing_key = %routing_key, "no publish connection, dropping publish");
            return false;
        };

        let result: redis::RedisResult<i64> = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(conn)
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(routing_key = %routing_key, event_id = %envelope.id, "event published");
                true
            }
            Err(err) => {
                tracing::warn!(routing_key = %routing_key, error = %err, "publish failed");
                if err.is_connection_dropped() || err.is_io_error() {
                    // Channel-level failure: commit to degraded mode until
                    // an explicit reconnect.
                    guard.take();
                    self.set_state(BusConnectionState::Degraded);
                }
                false
            }
        }
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
        let Some(client) = &self.client else {
            return false;
        };

        let mut pubsub = match client.get_async_connection().await {
            Ok(conn) => conn.into_pubsub(),
            Err(err) => {
                tracing::warn!(queue, error = %err, "failed to open consumer connection");
                return false;
            }
        };

        for pattern in patterns {
            let glob = Self::channel(exchange, pattern.as_str());
            if let Err(err) = pubsub.psubscribe(&glob).await {
                tracing::warn!(queue, pattern = %pattern, error = %err, "pattern bind failed");
                return false;
            }
        }

        tracing::info!(
            queue,
            exchange = %exchange,
            patterns = ?patterns.iter().map(TopicPattern::as_str).collect::<Vec<_>>(),
            "subscribed to events"
        );

        let queue = queue.to_string();
        let patterns = patterns.to_vec();
        let task = tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let Some((_, routing_key)) = channel.split_once(':') else {
                    continue;
                };

                // Exact topic semantics: the glob may over-match, and
                // overlapping patterns on one subscription must still
                // deliver a single copy.
                let Some(first_match) = patterns.iter().find(|p| p.matches(routing_key)) else {
                    continue;
                };
                let Ok(delivered_via) = msg.get_pattern::<String>() else {
                    continue;
                };
                if delivered_via != Self::channel(exchange, first_match.as_str()) {
                    continue;
                }

                let payload = match msg.get_payload::<String>() {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(queue = %queue, error = %err, "unreadable message payload");
                        continue;
                    }
                };
                let envelope: EventEnvelope = match serde_json::from_str(&payload) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(queue = %queue, error = %err, "malformed envelope, dead-lettering");
                        continue;
                    }
                };

                tracing::debug!(queue = %queue, event_type = %envelope.event_type, event_id = %envelope.id, "event received");
                match handler.handle(envelope.clone()).await {
                    Ok(()) => {
                        tracing::trace!(queue = %queue, event_id = %envelope.id, "message acked");
                    }
                    Err(err) => {
                        // Nack without requeue: the message is dropped,
                        // never retried.
                        tracing::warn!(
                            queue = %queue,
                            handler = handler.name(),
                            event_id = %envelope.id,
                            error = %err,
                            "handler failed, dead-lettering message"
                        );
                    }
                }
            }
            tracing::debug!(queue = %queue, "consumer stream ended");
        });

        self.consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
        true
    }

    async fn close(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut consumers = self
                .consumers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            consumers.drain(..).collect()
        };
        for task in tasks {
            task.abort();
        }
        self.publish_conn.lock().await.take();
        self.set_state(BusConnectionState::Degraded);
        tracing::info!("message bus closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_name_joins_exchange_and_key() {
        assert_eq!(
            RedisMessageBus::channel(Exchange::Tasks, "task.created"),
            "dispatch.tasks:task.created"
        );
    }

    #[tokio::test]
    async fn connect_to_unreachable_broker_degrades() {
        let bus = RedisMessageBus::connect("redis://127.0.0.1:1", "gateway").await;
        assert_eq!(bus.state(), BusConnectionState::Degraded);
    }

    #[tokio::test]
    async fn publish_while_degraded_returns_false_without_panic() {
        let bus = RedisMessageBus::connect("redis://127.0.0.1:1", "gateway").await;
        let ok = bus
            .publish(Exchange::Tasks, &RoutingKey::task("created"), json!({"id": 1}))
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn subscribe_while_degraded_returns_false() {
        let bus = RedisMessageBus::connect("redis://127.0.0.1:1", "gateway").await;

        struct NoopHandler;

        #[async_trait]
        impl EventHandler for NoopHandler {
            async fn handle(&self, _: EventEnvelope) -> Result<(), crate::domain::foundation::DomainError> {
                Ok(())
            }
            fn name(&self) -> &'static str {
                "NoopHandler"
            }
        }

        let ok = bus
            .subscribe(
                "task_events",
                Exchange::Tasks,
                &[TopicPattern::family("task")],
                Arc::new(NoopHandler),
            )
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn close_is_idempotent_even_when_never_connected() {
        let bus = RedisMessageBus::connect("redis://127.0.0.1:1", "gateway").await;
        bus.close().await;
        bus.close().await;
        assert_eq!(bus.state(), BusConnectionState::Degraded);
    }

    #[tokio::test]
    async fn invalid_url_degrades_instead_of_failing() {
        let bus = RedisMessageBus::connect("not-a-url", "gateway").await;
        assert_eq!(bus.state(), BusConnectionState::Degraded);
        assert!(
            !bus.publish(Exchange::Users, &RoutingKey::user("created"), json!({}))
                .await
        );
    }
}
