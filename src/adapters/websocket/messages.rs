//! WebSocket message protocol.
//!
//! Frames are JSON objects of the form `{ "event": <name>, "data": <payload> }`
//! in both directions, mirroring the named events of the original
//! socket transport.
//!
//! Server → client: `notification`, `location_update`,
//! `driver_location_update`, `system_notification`, `room_joined`,
//! `room_left`, `dashboard_stats`, `driver_status`, `error`.
//!
//! Client → server: `join_room`, `leave_room`, `location_update`,
//! `request_real_time_data`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::routing::NotificationKind;

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A targeted or role-scoped notification.
    Notification(NotificationPayload),

    /// Driver position update, delivered to the driver's own room.
    LocationUpdate(LocationPush),

    /// Driver position update, delivered to the admin dashboard.
    DriverLocationUpdate(LocationPush),

    /// Broadcast to every authenticated connection.
    SystemNotification(JsonValue),

    /// Acknowledges a successful `join_room` request.
    RoomJoined { room: String },

    /// Acknowledges a `leave_room` request.
    RoomLeft { room: String },

    /// Real-time dashboard counters (admin only).
    DashboardStats(DashboardStats),

    /// Driver connectivity snapshot (driver only).
    DriverStatus(DriverStatus),

    /// Request-level error; the connection stays open.
    Error { message: String },
}

/// Notification body: `{type, title, message, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: JsonValue,
}

/// Location push: the original payload spread flat, with `driverId` and a
/// delivery-time `timestamp` stamped on top.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPush {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
    pub timestamp: String,
}

impl LocationPush {
    /// Builds a push from an opaque location payload.
    ///
    /// Object payloads are spread into the frame; anything else lands
    /// under a `payload` key. `driverId`/`timestamp` keys in the payload
    /// are overridden by the authoritative values.
    pub fn new(driver_id: impl Into<String>, data: &JsonValue, timestamp: impl Into<String>) -> Self {
        let mut fields = match data {
            JsonValue::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other.clone());
                map
            }
        };
        fields.remove("driverId");
        fields.remove("timestamp");

        Self {
            driver_id: driver_id.into(),
            fields,
            timestamp: timestamp.into(),
        }
    }
}

/// Counters for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    #[serde(rename = "activeDrivers")]
    pub active_drivers: usize,
    #[serde(rename = "connectedUsers")]
    pub connected_users: usize,
}

/// Connectivity snapshot for a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverStatus {
    #[serde(rename = "isOnline")]
    pub is_online: bool,
    #[serde(rename = "lastUpdate")]
    pub last_update: String,
}

// ============================================
// Client → Server Messages
// ============================================

/// All request types a connected client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request to join a named room (validated per role).
    JoinRoom(String),

    /// Request to leave a named room (unvalidated).
    LeaveRoom(String),

    /// Driver position report; silently ignored for non-drivers.
    LocationUpdate(JsonValue),

    /// Request a real-time data snapshot (`dashboard_stats`, `driver_status`).
    RequestRealTimeData(String),
}
