//! WebSocket transport for the notification relay.
//!
//! This module only bridges axum sockets onto the relay. Connection
//! registration, lifecycle and delivery live in the `relay` crate so they can
//! be exercised without a network.

pub mod handler;
