use crate::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

// Type alias for user identities (web layer passes the raw `userId` query value)
pub type UserId = String;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint is going away (server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Handshake did not carry what the relay requires.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Cloneable handle onto one live bidirectional connection.
///
/// The handle never touches the socket itself. Writes are pushed onto an
/// unbounded channel that the transport's writer task drains, so a send never
/// waits on the network. All clones share the same closed flag, which makes
/// readiness a property of the connection rather than of any one clone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(sender: UnboundedSender<Outbound>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a handle together with the receiving end its writer task drains.
    pub fn channel() -> (Self, UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// True while the connection can accept an outbound write: it has not been
    /// closed locally and its writer is still draining the channel.
    pub fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queues a text frame. Fails if the handle is closed or the writer is gone.
    pub fn send_text(&self, frame: String) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::connection_closed());
        }
        self.sender
            .send(Outbound::Text(frame))
            .map_err(|_| Error::connection_closed())
    }

    /// Marks the connection closed and asks the writer to send a close frame.
    /// Only the first call has any effect; it returns `true`.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Writer may already be gone (peer hung up first)
        let _ = self.sender.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn send_text_queues_frame_for_writer() {
        let (handle, mut rx) = ConnectionHandle::channel();

        assert!(handle.is_ready());
        handle.send_text("hello".to_string()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("hello".to_string()));
    }

    #[test]
    fn close_is_idempotent_and_emits_one_close_frame() {
        let (handle, mut rx) = ConnectionHandle::channel();
        let clone = handle.clone();

        assert!(handle.close(CLOSE_NORMAL, "bye"));
        assert!(!clone.close(CLOSE_NORMAL, "bye again"));

        assert!(!clone.is_ready());
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close {
                code: CLOSE_NORMAL,
                reason: "bye".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_after_close_fails_without_writing() {
        let (handle, mut rx) = ConnectionHandle::channel();
        handle.close(CLOSE_NORMAL, "");
        let _ = rx.try_recv();

        let err = handle.send_text("late".to_string()).unwrap_err();
        assert_eq!(err.error_kind, crate::error::ErrorKind::ConnectionClosed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_writer_makes_handle_not_ready() {
        let (handle, rx) = ConnectionHandle::channel();
        drop(rx);

        assert!(!handle.is_ready());
        assert!(!handle.is_closed());
        assert!(handle.send_text("nobody listening".to_string()).is_err());
    }
}
