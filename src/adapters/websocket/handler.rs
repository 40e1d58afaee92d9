//! WebSocket upgrade handler and connection lifecycle.
//!
//! Connection flow:
//! 1. Client requests upgrade with a bearer token (query param or header)
//! 2. Gate verifies the token; failure rejects with 401 before upgrade
//! 3. On upgrade, the gate admits the session and assigns initial rooms
//! 4. Send task forwards queued pushes; receive task handles client
//!    requests (join/leave/location/real-time data)
//! 5. Teardown on disconnect: rooms first, then registry, synchronously

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;

use crate::domain::foundation::{ConnectionId, Identity, Timestamp};
use crate::domain::routing::{Exchange, RoutingKey};
use crate::ports::MessageBus;

use super::gate::ConnectionGate;
use super::messages::{ClientMessage, DashboardStats, DriverStatus, ServerMessage};
use super::registry::SessionRegistry;
use super::rooms::{RoomManager, RoomName};
use super::router::broadcast_location_update;

/// State shared by every WebSocket connection.
#[derive(Clone)]
pub struct GatewayState {
    pub gate: Arc<ConnectionGate>,
    pub registry: Arc<SessionRegistry>,
    pub rooms: Arc<RoomManager>,
    pub bus: Arc<dyn MessageBus>,
}

impl GatewayState {
    pub fn new(
        gate: Arc<ConnectionGate>,
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomManager>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            gate,
            registry,
            rooms,
            bus,
        }
    }
}

/// Query parameters for WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    /// Bearer token; may also arrive in the Authorization header.
    pub token: Option<String>,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
///
/// The token is validated before the upgrade so an unauthenticated
/// client is refused with 401 and no session ever exists.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> Response {
    let header_token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);
    let token = params.token.or(header_token);

    let identity = match state.gate.authenticate(token.as_deref()).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(error = %err, "connection rejected");
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Runs for the lifetime of one connection.
async fn handle_socket(socket: WebSocket, identity: Identity, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let admitted = state.gate.admit(identity, tx);
    let connection_id = admitted.connection_id;
    let identity = admitted.identity;

    // Forward queued pushes to the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize push");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Handle inbound client requests.
    let mut recv_task = {
        let state = state.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        handle_client_message(&text, &identity, connection_id, &state).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {
                        // Binary and protocol ping/pong frames are ignored.
                    }
                    Err(err) => {
                        tracing::debug!(connection_id = %connection_id, error = %err, "receive error");
                        break;
                    }
                }
            }
        })
    };

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.gate.teardown(&connection_id);
}

async fn handle_client_message(
    text: &str,
    identity: &Identity,
    connection_id: ConnectionId,
    state: &GatewayState,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(connection_id = %connection_id, error = %err, "unparseable client message");
            return;
        }
    };

    match message {
        ClientMessage::JoinRoom(name) => {
            let room = match RoomName::parse(&name) {
                Ok(room) => room,
                Err(err) => {
                    state.registry.send_to_connection(
                        &connection_id,
                        ServerMessage::Error {
                            message: err.to_string(),
                        },
                    );
                    return;
                }
            };
            match state.rooms.try_join(identity, connection_id, room.clone()) {
                Ok(()) => {
                    tracing::debug!(user_id = %identity.user_id, room = %room, "joined room");
                    state.registry.send_to_connection(
                        &connection_id,
                        ServerMessage::RoomJoined {
                            room: room.to_string(),
                        },
                    );
                }
                Err(err) => {
                    state.registry.send_to_connection(
                        &connection_id,
                        ServerMessage::Error {
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::LeaveRoom(name) => {
            let Ok(room) = RoomName::parse(&name) else {
                return;
            };
            state.rooms.leave(&room, &connection_id);
            tracing::debug!(user_id = %identity.user_id, room = %room, "left room");
            state.registry.send_to_connection(
                &connection_id,
                ServerMessage::RoomLeft {
                    room: room.to_string(),
                },
            );
        }

        ClientMessage::LocationUpdate(payload) => {
            if !identity.is_driver() {
                // Silently ignored: only drivers report positions.
                tracing::trace!(user_id = %identity.user_id, "location update from non-driver ignored");
                return;
            }

            broadcast_location_update(&state.registry, &state.rooms, &identity.user_id, &payload);

            let mut event = payload;
            if let JsonValue::Object(map) = &mut event {
                map.insert("driverId".to_string(), json!(identity.user_id.as_str()));
            }
            state
                .bus
                .publish(Exchange::Locations, &RoutingKey::location("updated"), event)
                .await;
        }

        ClientMessage::RequestRealTimeData(data_type) => match data_type.as_str() {
            "dashboard_stats" if identity.is_admin() => {
                state.registry.send_to_connection(
                    &connection_id,
                    ServerMessage::DashboardStats(DashboardStats {
                        active_drivers: state.registry.active_driver_count(),
                        connected_users: state.registry.connected_users().len(),
                    }),
                );
            }
            "driver_status" if identity.is_driver() => {
                state.registry.send_to_connection(
                    &connection_id,
                    ServerMessage::DriverStatus(DriverStatus {
                        is_online: true,
                        last_update: Timestamp::now().to_rfc3339(),
                    }),
                );
            }
            other => {
                tracing::trace!(
                    user_id = %identity.user_id,
                    data_type = other,
                    "real-time data request ignored"
                );
            }
        },
    }
}

/// Axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<GatewayState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
