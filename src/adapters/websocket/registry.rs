//! Session registry for live authenticated connections.
//!
//! Owns every [`Session`] exclusively. Connections are keyed two ways:
//! by [`ConnectionId`] for delivery and teardown, and by [`UserId`] for
//! direct pushes. The user index is last-writer-wins: a second
//! connection for the same user takes over the entry while the old
//! socket keeps running (it still receives room broadcasts until its
//! own teardown, just no direct pushes).
//!
//! All operations are synchronous and in-memory; locks are never held
//! across await points because there are none.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::domain::foundation::{ConnectionId, Identity, Role, Timestamp, UserId};

use super::messages::ServerMessage;

/// A live authenticated connection.
#[derive(Debug)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub connected_at: Timestamp,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    /// Creates a session wrapping the connection's outbound channel.
    pub fn new(
        connection_id: ConnectionId,
        identity: Identity,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            connection_id,
            identity,
            connected_at: Timestamp::now(),
            sender,
        }
    }

    /// Queues a message for this session's socket.
    ///
    /// Returns `false` when the socket task has already gone away; the
    /// message is simply lost (at-most-once delivery).
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

#[derive(Default)]
struct RegistryTable {
    sessions: HashMap<ConnectionId, Session>,
    by_user: HashMap<UserId, ConnectionId>,
}

/// Tracks every live session in the process.
#[derive(Default)]
pub struct SessionRegistry {
    table: RwLock<RegistryTable>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, replacing the user's previous registry entry.
    ///
    /// Returns the connection id of the replaced entry, if any. The
    /// replaced session itself stays registered under its connection id;
    /// only its own teardown removes it.
    pub fn register(&self, session: Session) -> Option<ConnectionId> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let user_id = session.identity.user_id.clone();
        let connection_id = session.connection_id;
        table.sessions.insert(connection_id, session);
        table
            .by_user
            .insert(user_id, connection_id)
            .filter(|previous| *previous != connection_id)
    }

    /// Removes a session by connection id. Idempotent.
    ///
    /// The user index is only cleared when it still points at this
    /// connection, so a stale socket's teardown never evicts the
    /// replacement session.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Identity> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let session = table.sessions.remove(connection_id)?;
        let user_id = session.identity.user_id.clone();
        if table.by_user.get(&user_id) == Some(connection_id) {
            table.by_user.remove(&user_id);
        }
        Some(session.identity)
    }

    /// Sends directly to the user's current connection.
    ///
    /// Returns `false` when the user has no live session; the push is
    /// skipped, never queued.
    pub fn send_to_user(&self, user_id: &UserId, message: ServerMessage) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_user
            .get(user_id)
            .and_then(|conn| table.sessions.get(conn))
            .map(|session| session.send(message))
            .unwrap_or(false)
    }

    /// Sends to one connection by id.
    pub fn send_to_connection(&self, connection_id: &ConnectionId, message: ServerMessage) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .sessions
            .get(connection_id)
            .map(|session| session.send(message))
            .unwrap_or(false)
    }

    /// Sends to a snapshot of connections, returning how many accepted.
    ///
    /// Connections that disappeared since the snapshot was taken are
    /// skipped without error.
    pub fn send_to_connections(
        &self,
        connection_ids: &[ConnectionId],
        message: &ServerMessage,
    ) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        connection_ids
            .iter()
            .filter_map(|conn| table.sessions.get(conn))
            .filter(|session| session.send(message.clone()))
            .count()
    }

    /// True when the user has a live registry entry.
    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user
            .contains_key(user_id)
    }

    /// Users with a live registry entry.
    pub fn connected_users(&self) -> Vec<UserId> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user
            .keys()
            .cloned()
            .collect()
    }

    /// Total live sessions (stale duplicates included).
    pub fn session_count(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .len()
    }

    /// Live sessions whose identity is a driver.
    pub fn active_driver_count(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_user
            .values()
            .filter_map(|conn| table.sessions.get(conn))
            .filter(|session| session.identity.role == Role::Driver)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(id: &str, role: Role) -> Identity {
        Identity::new(
            UserId::new(id).unwrap(),
            role,
            format!("{id}@example.com"),
            None,
        )
    }

    fn session(id: &str, role: Role) -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(ConnectionId::new(), identity(id, role), tx), rx)
    }

    fn broadcast_msg() -> ServerMessage {
        ServerMessage::SystemNotification(json!({"message": "hi"}))
    }

    #[test]
    fn register_and_direct_push() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = session("u1", Role::Driver);
        registry.register(session);

        let user = UserId::new("u1").unwrap();
        assert!(registry.is_connected(&user));
        assert!(registry.send_to_user(&user, broadcast_msg()));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn push_to_offline_user_is_skipped() {
        let registry = SessionRegistry::new();
        let user = UserId::new("ghost").unwrap();
        assert!(!registry.send_to_user(&user, broadcast_msg()));
    }

    #[test]
    fn second_connection_takes_over_direct_pushes() {
        let registry = SessionRegistry::new();
        let (old, mut old_rx) = session("u1", Role::Driver);
        let old_conn = old.connection_id;
        assert!(registry.register(old).is_none());

        let (new, mut new_rx) = session("u1", Role::Driver);
        let replaced = registry.register(new);
        assert_eq!(replaced, Some(old_conn));

        let user = UserId::new("u1").unwrap();
        registry.send_to_user(&user, broadcast_msg());
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());

        // The stale socket is still addressable by connection id.
        assert!(registry.send_to_connection(&old_conn, broadcast_msg()));
        assert!(old_rx.try_recv().is_ok());
    }

    #[test]
    fn stale_teardown_does_not_evict_replacement() {
        let registry = SessionRegistry::new();
        let (old, _old_rx) = session("u1", Role::Driver);
        let old_conn = old.connection_id;
        registry.register(old);

        let (new, _new_rx) = session("u1", Role::Driver);
        registry.register(new);

        registry.remove(&old_conn);

        let user = UserId::new("u1").unwrap();
        assert!(registry.is_connected(&user));
    }

    #[test]
    fn remove_clears_user_and_is_idempotent() {
        let registry = SessionRegistry::new();
        let (session, _rx) = session("u1", Role::Admin);
        let conn = session.connection_id;
        registry.register(session);

        assert!(registry.remove(&conn).is_some());
        assert!(registry.remove(&conn).is_none());

        let user = UserId::new("u1").unwrap();
        assert!(!registry.is_connected(&user));
        assert!(registry.connected_users().is_empty());
    }

    #[test]
    fn send_to_connections_counts_deliveries() {
        let registry = SessionRegistry::new();
        let (s1, mut rx1) = session("u1", Role::Driver);
        let (s2, mut rx2) = session("u2", Role::Driver);
        let conns = vec![s1.connection_id, s2.connection_id, ConnectionId::new()];
        registry.register(s1);
        registry.register(s2);

        let delivered = registry.send_to_connections(&conns, &broadcast_msg());
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn active_driver_count_ignores_admins() {
        let registry = SessionRegistry::new();
        let (d1, _r1) = session("d1", Role::Driver);
        let (d2, _r2) = session("d2", Role::Driver);
        let (a1, _r3) = session("a1", Role::Admin);
        registry.register(d1);
        registry.register(d2);
        registry.register(a1);

        assert_eq!(registry.active_driver_count(), 2);
        assert_eq!(registry.session_count(), 3);
    }

    #[test]
    fn send_fails_after_receiver_dropped() {
        let registry = SessionRegistry::new();
        let (session, rx) = session("u1", Role::Driver);
        registry.register(session);
        drop(rx);

        let user = UserId::new("u1").unwrap();
        assert!(!registry.send_to_user(&user, broadcast_msg()));
    }
}
