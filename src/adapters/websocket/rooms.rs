//! Room management for role- and entity-scoped broadcast targeting.
//!
//! Rooms are an arena keyed by [`RoomName`]; every membership mutation
//! goes through the [`RoomManager`] so the maps never race. Broadcasts
//! iterate a snapshot of the member set taken at call time: a session
//! disconnecting mid-broadcast simply misses that message.
//!
//! # Room assignment
//!
//! ```text
//! every session   → authenticated_users
//! admin           → admins, all_notifications
//! driver          → drivers, driver_{userId}
//! ```
//!
//! Runtime join requests are checked against a per-role capability
//! table: admins may join anything, drivers only `drivers`, their own
//! `driver_{userId}` room, and the shared `general` room.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::domain::foundation::{ConnectionId, Identity, Role, UserId, ValidationError};

use super::messages::ServerMessage;
use super::registry::SessionRegistry;

/// Name of a broadcast room.
///
/// Well-known rooms are variants; admins may also create ad-hoc rooms,
/// which parse as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomName {
    AuthenticatedUsers,
    Admins,
    AllNotifications,
    Drivers,
    General,
    /// A driver's personal room, `driver_{userId}`.
    Driver(UserId),
    Custom(String),
}

impl RoomName {
    /// The personal room of the given driver.
    pub fn driver(user_id: &UserId) -> Self {
        RoomName::Driver(user_id.clone())
    }

    /// Parses a client-supplied room name.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::empty_field("room"));
        }
        Ok(match name {
            "authenticated_users" => RoomName::AuthenticatedUsers,
            "admins" => RoomName::Admins,
            "all_notifications" => RoomName::AllNotifications,
            "drivers" => RoomName::Drivers,
            "general" => RoomName::General,
            other => match other.strip_prefix("driver_") {
                Some(id) if !id.is_empty() => RoomName::Driver(UserId::new(id)?),
                _ => RoomName::Custom(other.to_string()),
            },
        })
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomName::AuthenticatedUsers => write!(f, "authenticated_users"),
            RoomName::Admins => write!(f, "admins"),
            RoomName::AllNotifications => write!(f, "all_notifications"),
            RoomName::Drivers => write!(f, "drivers"),
            RoomName::General => write!(f, "general"),
            RoomName::Driver(user_id) => write!(f, "driver_{user_id}"),
            RoomName::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Rooms a session joins at connection time, by role.
pub fn initial_rooms(identity: &Identity) -> Vec<RoomName> {
    let mut rooms = vec![RoomName::AuthenticatedUsers];
    match identity.role {
        Role::Admin => {
            rooms.push(RoomName::Admins);
            rooms.push(RoomName::AllNotifications);
        }
        Role::Driver => {
            rooms.push(RoomName::Drivers);
            rooms.push(RoomName::driver(&identity.user_id));
        }
    }
    rooms
}

/// Capability table for runtime join requests.
pub fn can_join(identity: &Identity, room: &RoomName) -> bool {
    match identity.role {
        Role::Admin => true,
        Role::Driver => matches!(room, RoomName::Drivers | RoomName::General)
            || *room == RoomName::driver(&identity.user_id),
    }
}

/// Join request rejections, pushed back to the requester as an `error`
/// event. The connection is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Not allowed to join room '{room}'")]
    AccessDenied { room: String },
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<RoomName>>,
}

/// Arena of rooms; the single owner of membership state.
#[derive(Default)]
pub struct RoomManager {
    table: RwLock<RoomTable>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room, creating the room on first join.
    ///
    /// Unchecked: used by the connection gate for initial assignments.
    /// Runtime requests go through [`RoomManager::try_join`].
    pub fn join(&self, room: RoomName, connection_id: ConnectionId) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
        table
            .memberships
            .entry(connection_id)
            .or_default()
            .insert(room);
    }

    /// Validates a runtime join request against the capability table.
    pub fn try_join(
        &self,
        identity: &Identity,
        connection_id: ConnectionId,
        room: RoomName,
    ) -> Result<(), RoomError> {
        if !can_join(identity, &room) {
            return Err(RoomError::AccessDenied {
                room: room.to_string(),
            });
        }
        self.join(room, connection_id);
        Ok(())
    }

    /// Removes a connection from one room, dropping the room when empty.
    pub fn leave(&self, room: &RoomName, connection_id: &ConnectionId) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(members) = table.rooms.get_mut(room) {
            members.remove(connection_id);
            if members.is_empty() {
                table.rooms.remove(room);
            }
        }
        if let Some(rooms) = table.memberships.get_mut(connection_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                table.memberships.remove(connection_id);
            }
        }
    }

    /// Removes a connection from every room. Idempotent teardown.
    pub fn leave_all(&self, connection_id: &ConnectionId) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let Some(rooms) = table.memberships.remove(connection_id) else {
            return;
        };
        for room in rooms {
            if let Some(members) = table.rooms.get_mut(&room) {
                members.remove(connection_id);
                if members.is_empty() {
                    table.rooms.remove(&room);
                }
            }
        }
    }

    /// Snapshot of a room's members at call time.
    pub fn members(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection currently belongs to.
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomName> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Member count of a room (0 when the room does not exist).
    pub fn member_count(&self, room: &RoomName) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rooms
            .get(room)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Broadcasts to a snapshot of the room through the registry.
    ///
    /// Returns how many sessions accepted the message. Members whose
    /// session vanished between snapshot and send are skipped.
    pub fn broadcast(
        &self,
        registry: &SessionRegistry,
        room: &RoomName,
        message: &ServerMessage,
    ) -> usize {
        let members = self.members(room);
        if members.is_empty() {
            return 0;
        }
        registry.send_to_connections(&members, message)
    }
}
