//! Connection gate: identity validation and initial room assignment.
//!
//! The gate is the only way a connection becomes a [`Session`]. It
//! delegates token verification to the external auth collaborator via
//! the [`TokenVerifier`] port, then registers the session and joins the
//! role-determined initial rooms. Teardown is synchronous and
//! idempotent: once it returns, no broadcast can target the connection.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::foundation::{AuthError, ConnectionId, Identity};
use crate::ports::TokenVerifier;

use super::messages::ServerMessage;
use super::registry::{Session, SessionRegistry};
use super::rooms::{initial_rooms, RoomManager, RoomName};

/// Result of admitting a connection.
#[derive(Debug)]
pub struct AdmittedConnection {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub rooms: Vec<RoomName>,
}

/// Validates connections and owns their session lifecycle.
pub struct ConnectionGate {
    verifier: Arc<dyn TokenVerifier>,
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomManager>,
}

impl ConnectionGate {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomManager>,
    ) -> Self {
        Self {
            verifier,
            registry,
            rooms,
        }
    }

    /// Verifies the bearer token presented at handshake.
    ///
    /// A missing token is rejected the same way as an invalid one; no
    /// session exists until [`ConnectionGate::admit`] runs.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::InvalidToken)?;
        self.verifier.verify(token).await
    }

    /// Creates and registers the session for a verified identity.
    ///
    /// Registration is last-writer-wins per user; the session joins
    /// `authenticated_users` plus its role's rooms.
    pub fn admit(
        &self,
        identity: Identity,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> AdmittedConnection {
        let connection_id = ConnectionId::new();
        let session = Session::new(connection_id, identity.clone(), sender);

        if let Some(previous) = self.registry.register(session) {
            tracing::debug!(
                user_id = %identity.user_id,
                previous_connection = %previous,
                "user reconnected, registry entry replaced"
            );
        }

        let rooms = initial_rooms(&identity);
        for room in &rooms {
            self.rooms.join(room.clone(), connection_id);
        }

        tracing::info!(
            user_id = %identity.user_id,
            role = %identity.role,
            connection_id = %connection_id,
            rooms = ?rooms.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "user connected"
        );

        AdmittedConnection {
            connection_id,
            identity,
            rooms,
        }
    }

    /// Tears a connection down: all rooms first, then the registry.
    ///
    /// Synchronous so a subsequent broadcast can never target the
    /// connection; safe to call more than once.
    pub fn teardown(&self, connection_id: &ConnectionId) {
        self.rooms.leave_all(connection_id);
        if let Some(identity) = self.registry.remove(connection_id) {
            tracing::info!(
                user_id = %identity.user_id,
                connection_id = %connection_id,
                "user disconnected"
            );
        }
    }
}
