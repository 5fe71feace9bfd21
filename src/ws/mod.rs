//! WebSocket transport, connection hub and inbound dispatch

pub mod dispatch;
pub mod handler;
pub mod hub;
pub mod protocol;
