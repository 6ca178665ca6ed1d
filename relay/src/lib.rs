//! Real-time notification relay.
//!
//! This crate keeps track of which user is connected on which live
//! bidirectional connection and pushes notifications to them. It is
//! transport-agnostic: the web layer owns the sockets and drains each
//! connection's outbound channel.
//!
//! # Architecture
//!
//! - **Single connection per user**: the registry maps an identity to exactly
//!   one connection. A reconnect replaces the previous entry; the superseded
//!   connection is left open and only deregisters itself if it still owns the
//!   entry when it closes.
//! - **Explicit lifecycle**: every connection runs through
//!   `Accepted -> Identified -> Active -> Closed` with idempotent teardown.
//! - **User and Broadcast scopes**: notifications go to one user or to every
//!   connected user.
//! - **Best-effort delivery**: if a user is offline or their connection is not
//!   ready, the send reports `false` (or is not counted) and nothing is queued.
//!
//! # Message Flow
//!
//! 1. Client opens the WebSocket endpoint with `?userId=<identity>`
//! 2. Web layer creates a `ConnectionHandle` and starts a `Lifecycle`
//! 3. Lifecycle registers the handle and pushes a `connection` envelope
//! 4. Business logic publishes a `DomainEvent` (or calls the `Manager`)
//! 5. `Manager` looks up the handle and queues a `notification` envelope
//! 6. On close the lifecycle releases its registry entry
//!
//! # Example: Sending a notification
//!
//! ```rust,ignore
//! use relay::message::Notification;
//!
//! let delivered = app_state.relay.send_to_user(
//!     &recipient_id,
//!     &Notification::with_payload("Booking confirmed", json!({ "booking_id": id })),
//! );
//! ```
//!
//! # Modules
//!
//! - `connection`: `ConnectionHandle`, `ConnectionId` and outbound frames
//! - `registry`: `ConnectionRegistry`, the identity to connection map
//! - `lifecycle`: per-connection state machine
//! - `manager`: delivery engine (targeted send, broadcast, shutdown)
//! - `message`: notification, envelope and scope definitions
//! - `domain_event_handler`: bridges `events::DomainEvent` into deliveries

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod message;
pub mod registry;

pub use manager::Manager;
