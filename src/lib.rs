//! Dispatch Hub - real-time notification gateway
//!
//! Event-driven notification fabric for a delivery-task tracking system:
//! a topic-based message bus client plus a session/room multiplexer that
//! turns bus events into per-user and per-role WebSocket pushes.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
