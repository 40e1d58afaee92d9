//! Real-time connection layer: sessions, rooms, and the notification
//! router that bridges bus events onto live WebSocket pushes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Message Bus                           │
//! │   RedisMessageBus (production) │ InMemoryMessageBus (test)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ notification.*
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   NotificationRouter                        │
//! │   envelope subtype → direct push / room broadcast           │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                          │
//!                 ▼                          ▼
//! ┌──────────────────────────┐  ┌──────────────────────────────┐
//! │     SessionRegistry      │  │         RoomManager          │
//! │  userId → live session   │  │  authenticated_users, admins │
//! │  (last-writer-wins)      │  │  drivers, driver_{id}, ...   │
//! └──────────────────────────┘  └──────────────────────────────┘
//!                 ▲
//!                 │ admit / teardown
//! ┌──────────────────────────┐
//! │      ConnectionGate      │ ← TokenVerifier port
//! └──────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - client/server frame protocol
//! - [`registry`] - live session tracking
//! - [`rooms`] - room arena and capability table
//! - [`gate`] - connection validation and lifecycle
//! - [`router`] - bus-to-push dispatch
//! - [`handler`] - axum WebSocket transport

pub mod gate;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod rooms;
pub mod router;

pub use gate::{AdmittedConnection, ConnectionGate};
pub use handler::{websocket_router, ws_handler, GatewayState};
pub use messages::{
    ClientMessage, DashboardStats, DriverStatus, LocationPush, NotificationPayload, ServerMessage,
};
pub use registry::{Session, SessionRegistry};
pub use rooms::{can_join, initial_rooms, RoomError, RoomManager, RoomName};
pub use router::{broadcast_location_update, NotificationRouter};
