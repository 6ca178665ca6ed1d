use crate::connection::{ConnectionHandle, CLOSE_GOING_AWAY};
use crate::lifecycle::Lifecycle;
use crate::message::{Envelope, Message as RelayMessage, MessageScope, Notification};
use crate::registry::ConnectionRegistry;
use log::*;
use std::sync::Arc;

/// Delivery engine: best-effort targeted and broadcast pushes over the registry.
///
/// Writes are fire-and-forget. Nothing is retried or queued for offline users;
/// callers that need durability keep their own record of what was sent.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ConnectionRegistry::new()))
    }

    pub fn with_registry(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Start the lifecycle of a freshly accepted connection against this
    /// manager's registry.
    pub fn accept(&self, handle: ConnectionHandle) -> Lifecycle {
        Lifecycle::accept(Arc::clone(&self.registry), handle)
    }

    /// Push a notification to one user. Returns `true` only if a ready
    /// connection was found and the frame was handed to it.
    pub fn send_to_user(&self, user_id: &str, notification: &Notification) -> bool {
        let Some(handle) = self.registry.lookup(user_id) else {
            debug!("No connection registered for user {user_id}");
            return false;
        };

        if !handle.is_ready() {
            debug!("Connection {} for user {user_id} is not ready", handle.id());
            return false;
        }

        let frame = match Envelope::notification(notification).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize notification: {e}");
                return false;
            }
        };

        match handle.send_text(frame) {
            Ok(()) => {
                debug!(
                    "Sent notification \"{}\" to user {user_id}",
                    notification.title()
                );
                true
            }
            Err(e) => {
                warn!(
                    "Failed to send notification to connection {}: {e}",
                    handle.id()
                );
                false
            }
        }
    }

    /// Push a notification to every ready connection. Returns the number of
    /// connections the frame was handed to.
    pub fn broadcast(&self, notification: &Notification) -> usize {
        let frame = match Envelope::notification(notification).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize broadcast notification: {e}");
                return 0;
            }
        };

        let mut sent = 0;
        self.registry.for_each(|user_id, handle| {
            if !handle.is_ready() {
                trace!("Skipping connection {} for user {user_id}", handle.id());
                return;
            }
            match handle.send_text(frame.clone()) {
                Ok(()) => sent += 1,
                Err(e) => warn!(
                    "Failed to send broadcast to connection {}: {e}",
                    handle.id()
                ),
            }
        });

        debug!(
            "Broadcast notification \"{}\" to {sent} connection(s)",
            notification.title()
        );
        sent
    }

    /// Send a message based on its scope. Returns the number of connections
    /// the notification was handed to.
    pub fn send_message(&self, message: RelayMessage) -> usize {
        match message.scope {
            MessageScope::User { user_id } => {
                usize::from(self.send_to_user(&user_id, &message.notification))
            }
            MessageScope::Broadcast => self.broadcast(&message.notification),
        }
    }

    /// Close every registered connection, e.g. on process shutdown. Each
    /// connection's own lifecycle observes the closed handle and deregisters.
    pub fn shutdown(&self) -> usize {
        let mut closed = 0;
        self.registry.for_each(|_, handle| {
            if handle.close(CLOSE_GOING_AWAY, "server shutting down") {
                closed += 1;
            }
        });
        info!("Closed {closed} connection(s) for shutdown");
        closed
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
