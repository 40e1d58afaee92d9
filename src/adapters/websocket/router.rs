//! Notification router: bus events to live connection pushes.
//!
//! Subscribes to the `notifications` exchange with pattern
//! `notification.*` and dispatches by routing-key suffix:
//!
//! - `user_update` / `task_update` → direct push to the target session
//!   plus a role-scoped variant to the `admins` room
//! - `location_update` → `driver_{id}` room and `admins` room, stamped
//!   at delivery time
//! - `broadcast` → `authenticated_users`
//! - anything else → logged and dropped
//!
//! Delivery is best-effort to currently-connected clients only: an
//! offline target is skipped, never queued or retried.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope, Timestamp, UserId};
use crate::domain::routing::{queues, Exchange, NotificationKind, TopicPattern};
use crate::ports::{EventHandler, MessageBus};

use super::messages::{LocationPush, NotificationPayload, ServerMessage};
use super::registry::SessionRegistry;
use super::rooms::{RoomManager, RoomName};

/// Pushes a location update to the driver's room and the admin dashboard.
///
/// Both pushes carry the same delivery-time timestamp so the two rooms
/// see one dispatch cycle. Shared by the router (bus-driven updates) and
/// the socket handler (driver-reported updates).
pub fn broadcast_location_update(
    registry: &SessionRegistry,
    rooms: &RoomManager,
    driver_id: &UserId,
    data: &JsonValue,
) {
    let timestamp = Timestamp::now().to_rfc3339();
    let push = LocationPush::new(driver_id.as_str(), data, timestamp);

    rooms.broadcast(
        registry,
        &RoomName::driver(driver_id),
        &ServerMessage::LocationUpdate(push.clone()),
    );
    rooms.broadcast(
        registry,
        &RoomName::Admins,
        &ServerMessage::DriverLocationUpdate(push),
    );
}

/// Maps `notification.*` envelopes onto session and room pushes.
pub struct NotificationRouter {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomManager>,
}

impl NotificationRouter {
    pub fn new(registry: Arc<SessionRegistry>, rooms: Arc<RoomManager>) -> Self {
        Self { registry, rooms }
    }

    /// Creates as an Arc ready to hand to the bus.
    pub fn new_shared(registry: Arc<SessionRegistry>, rooms: Arc<RoomManager>) -> Arc<Self> {
        Arc::new(Self::new(registry, rooms))
    }

    /// Binds this router to the notifications exchange.
    pub async fn register(self: &Arc<Self>, bus: &dyn MessageBus) -> bool {
        bus.subscribe(
            queues::NOTIFICATION_EVENTS,
            Exchange::Notifications,
            &[TopicPattern::family("notification")],
            Arc::clone(self) as Arc<dyn EventHandler>,
        )
        .await
    }

    fn dispatch_user_update(&self, data: &JsonValue) {
        if let Some(target) = target_user(data, "id") {
            let delivered = self.registry.send_to_user(
                &target,
                ServerMessage::Notification(NotificationPayload {
                    kind: NotificationKind::UserUpdate,
                    title: "Profile updated".to_string(),
                    message: "Your profile has been updated".to_string(),
                    data: data.clone(),
                }),
            );
            if !delivered {
                tracing::debug!(user_id = %target, "target offline, skipping direct push");
            }
        }

        let name = data
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown");
        self.rooms.broadcast(
            &self.registry,
            &RoomName::Admins,
            &ServerMessage::Notification(NotificationPayload {
                kind: NotificationKind::UserUpdate,
                title: "User updated".to_string(),
                message: format!("User {name} has been updated"),
                data: data.clone(),
            }),
        );
    }

    fn dispatch_task_update(&self, data: &JsonValue) {
        let title = data
            .get("title")
            .and_then(JsonValue::as_str)
            .unwrap_or("untitled");

        if let Some(target) = target_user(data, "driver_id") {
            let delivered = self.registry.send_to_user(
                &target,
                ServerMessage::Notification(NotificationPayload {
                    kind: NotificationKind::TaskUpdate,
                    title: "Task updated".to_string(),
                    message: format!("Your task \"{title}\" has been updated"),
                    data: data.clone(),
                }),
            );
            if !delivered {
                tracing::debug!(user_id = %target, "target offline, skipping direct push");
            }
        }

        self.rooms.broadcast(
            &self.registry,
            &RoomName::Admins,
            &ServerMessage::Notification(NotificationPayload {
                kind: NotificationKind::TaskUpdate,
                title: "Task updated".to_string(),
                message: format!("Task \"{title}\" has been updated"),
                data: data.clone(),
            }),
        );
    }

    fn dispatch_location_update(&self, data: &JsonValue) {
        let Some(driver_id) = target_user(data, "driverId") else {
            tracing::warn!("location update without driverId, dropping");
            return;
        };
        broadcast_location_update(&self.registry, &self.rooms, &driver_id, data);
    }

    fn dispatch_broadcast(&self, data: &JsonValue) {
        self.rooms.broadcast(
            &self.registry,
            &RoomName::AuthenticatedUsers,
            &ServerMessage::SystemNotification(data.clone()),
        );
    }
}

/// Reads a user id out of the payload, accepting strings and numbers
/// (ids cross service boundaries in both shapes).
fn target_user(data: &JsonValue, key: &str) -> Option<UserId> {
    match data.get(key)? {
        JsonValue::String(s) => UserId::new(s.as_str()).ok(),
        JsonValue::Number(n) => UserId::new(n.to_string()).ok(),
        _ => None,
    }
}

#[async_trait]
impl EventHandler for NotificationRouter {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        match NotificationKind::parse(event.type_suffix()) {
            Some(NotificationKind::UserUpdate) => self.dispatch_user_update(&event.data),
            Some(NotificationKind::TaskUpdate) => self.dispatch_task_update(&event.data),
            Some(NotificationKind::LocationUpdate) => self.dispatch_location_update(&event.data),
            Some(NotificationKind::Broadcast) => self.dispatch_broadcast(&event.data),
            None => {
                // Returning Err here would dead-letter the message.
                tracing::warn!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "unhandled notification subtype, dropping"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "NotificationRouter"
    }
}
