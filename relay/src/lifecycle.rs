//! Per-connection state machine.
//!
//! `Accepted -> Identified -> Active -> Closed`, where `Closed` can be entered
//! from any state exactly once. The transport layer drives the machine: it
//! calls [`Lifecycle::identify`] with the handshake query, feeds inbound text
//! through [`Lifecycle::on_frame`] and calls [`Lifecycle::close`] from every
//! place a connection can end. Dropping the lifecycle closes it as well.

use crate::connection::{ConnectionHandle, UserId, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION};
use crate::message::{Envelope, CONNECTED_MESSAGE};
use crate::registry::ConnectionRegistry;
use log::*;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

/// Handshake query parameter carrying the connecting identity.
pub const USER_ID_PARAM: &str = "userId";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Accepted = 0,
    Identified = 1,
    Active = 2,
    Closed = 3,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::Accepted,
            1 => State::Identified,
            2 => State::Active,
            _ => State::Closed,
        }
    }
}

pub struct Lifecycle {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
    user_id: OnceLock<UserId>,
    state: AtomicU8,
}

impl Lifecycle {
    pub fn accept(registry: Arc<ConnectionRegistry>, handle: ConnectionHandle) -> Self {
        trace!("Accepted connection {}", handle.id());
        Self {
            registry,
            handle,
            user_id: OnceLock::new(),
            state: AtomicU8::new(State::Accepted as u8),
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.get().map(String::as_str)
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Identify the connection from its handshake query string and, on success,
    /// register it and push the connection acknowledgement.
    ///
    /// A missing or empty `userId` rejects the connection: it is closed with a
    /// policy-violation code and never registered. Returns the resulting state.
    pub fn identify(&self, query: Option<&str>) -> State {
        if self.state() != State::Accepted {
            return self.state();
        }

        let Some(user_id) = user_id_from_query(query) else {
            info!(
                "Rejecting connection {}: no {USER_ID_PARAM} in handshake",
                self.handle.id()
            );
            self.close_with(CLOSE_POLICY_VIOLATION, "userId query parameter is required");
            return State::Closed;
        };

        if !self.transition(State::Accepted, State::Identified) {
            return self.state();
        }
        if self.user_id.set(user_id.clone()).is_err() {
            return self.state();
        }

        self.registry.register(user_id.clone(), self.handle.clone());

        if !self.transition(State::Identified, State::Active) {
            // Closed while registering; teardown may have run before the insert
            self.registry.release(&user_id, self.handle.id());
            return State::Closed;
        }

        info!("Registered connection {} for user {}", self.handle.id(), user_id);

        match Envelope::connection(CONNECTED_MESSAGE).to_frame() {
            Ok(frame) => {
                if let Err(e) = self.handle.send_text(frame) {
                    warn!(
                        "Failed to acknowledge connection {}: {e}",
                        self.handle.id()
                    );
                }
            }
            Err(e) => error!("Failed to serialize connection acknowledgement: {e}"),
        }

        State::Active
    }

    /// Parse an inbound text frame as JSON.
    ///
    /// Malformed frames, and frames arriving outside the `Active` state, are
    /// logged and discarded. The parsed value is handed back for whatever
    /// collaborator wants it.
    pub fn on_frame(&self, text: &str) -> Option<Value> {
        if self.state() != State::Active {
            debug!("Ignoring frame on inactive connection {}", self.handle.id());
            return None;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                debug!(
                    "Received frame from user {}: {value}",
                    self.user_id().unwrap_or_default()
                );
                Some(value)
            }
            Err(e) => {
                warn!(
                    "Discarding malformed frame on connection {}: {e}",
                    self.handle.id()
                );
                None
            }
        }
    }

    /// Tear the connection down. Safe to call from every close path; only the
    /// first call deregisters and closes the handle, and only it returns `true`.
    pub fn close(&self) -> bool {
        self.close_with(CLOSE_NORMAL, "")
    }

    pub fn close_with(&self, code: u16, reason: &str) -> bool {
        let previous = State::from_u8(self.state.swap(State::Closed as u8, Ordering::AcqRel));
        if previous == State::Closed {
            return false;
        }

        if let Some(user_id) = self.user_id.get() {
            if self.registry.release(user_id, self.handle.id()) {
                info!(
                    "Connection {} for user {} closed and deregistered",
                    self.handle.id(),
                    user_id
                );
            } else {
                debug!(
                    "Connection {} for user {} closed; registry entry already gone or superseded",
                    self.handle.id(),
                    user_id
                );
            }
        }

        self.handle.close(code, reason);
        true
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Extract a non-empty `userId` from a raw (still percent-encoded) query string.
pub fn user_id_from_query(query: Option<&str>) -> Option<UserId> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == USER_ID_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn accept() -> (Arc<ConnectionRegistry>, Lifecycle, UnboundedReceiver<Outbound>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (handle, rx) = ConnectionHandle::channel();
        let lifecycle = Lifecycle::accept(Arc::clone(&registry), handle);
        (registry, lifecycle, rx)
    }

    #[test]
    fn user_id_is_read_from_query() {
        assert_eq!(
            user_id_from_query(Some("userId=alice%40example.com&x=1")),
            Some("alice@example.com".to_string())
        );
        assert_eq!(user_id_from_query(Some("userId=")), None);
        assert_eq!(user_id_from_query(Some("user=bob")), None);
        assert_eq!(user_id_from_query(None), None);
    }

    #[test]
    fn identified_connection_is_registered_and_acknowledged() {
        let (registry, lifecycle, mut rx) = accept();

        assert_eq!(lifecycle.identify(Some("userId=u1")), State::Active);
        assert_eq!(lifecycle.user_id(), Some("u1"));
        assert_eq!(registry.lookup("u1").unwrap().id(), lifecycle.handle().id());

        let Outbound::Text(frame) = rx.try_recv().unwrap() else {
            panic!("expected an acknowledgement text frame");
        };
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["message"], CONNECTED_MESSAGE);
    }

    #[test]
    fn missing_user_id_rejects_without_registering() {
        let (registry, lifecycle, mut rx) = accept();

        assert_eq!(lifecycle.identify(Some("token=abc")), State::Closed);
        assert!(registry.is_empty());
        assert!(lifecycle.handle().is_closed());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Outbound::Close {
                code: CLOSE_POLICY_VIOLATION,
                ..
            }
        ));
    }

    #[test]
    fn malformed_frame_is_discarded_and_connection_stays_active() {
        let (_registry, lifecycle, _rx) = accept();
        lifecycle.identify(Some("userId=u1"));

        assert!(lifecycle.on_frame("{not json").is_none());
        assert_eq!(lifecycle.state(), State::Active);
        assert_eq!(
            lifecycle.on_frame(r#"{"type":"ping"}"#).unwrap()["type"],
            "ping"
        );
    }

    #[test]
    fn close_deregisters_exactly_once_under_concurrent_signals() {
        let (registry, lifecycle, _rx) = accept();
        lifecycle.identify(Some("userId=u1"));

        let teardowns = std::thread::scope(|scope| {
            let closers: Vec<_> = (0..8).map(|_| scope.spawn(|| lifecycle.close())).collect();
            closers
                .into_iter()
                .map(|closer| closer.join())
                .filter(|closed| matches!(closed, Ok(true)))
                .count()
        });

        assert_eq!(teardowns, 1);
        assert_eq!(lifecycle.state(), State::Closed);
        assert!(registry.lookup("u1").is_none());
    }

    #[test]
    fn concurrent_identify_registers_only_the_winning_identity() {
        let (registry, lifecycle, _rx) = accept();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let lifecycle = &lifecycle;
                scope.spawn(move || lifecycle.identify(Some(&format!("userId=u{i}"))));
            }
        });

        assert_eq!(lifecycle.state(), State::Active);
        assert_eq!(registry.len(), 1);
        let user_id = lifecycle.user_id().unwrap().to_string();
        assert_eq!(registry.lookup(&user_id).unwrap().id(), lifecycle.handle().id());

        lifecycle.close();
        assert!(registry.is_empty());
    }

    #[test]
    fn superseded_connection_teardown_keeps_replacement() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (first_handle, _first_rx) = ConnectionHandle::channel();
        let (second_handle, _second_rx) = ConnectionHandle::channel();
        let first = Lifecycle::accept(Arc::clone(&registry), first_handle);
        let second = Lifecycle::accept(Arc::clone(&registry), second_handle);

        first.identify(Some("userId=u1"));
        second.identify(Some("userId=u1"));
        assert!(first.handle().is_ready());

        first.close();

        assert_eq!(registry.lookup("u1").unwrap().id(), second.handle().id());
    }

    #[test]
    fn close_before_identify_prevents_registration() {
        let (registry, lifecycle, _rx) = accept();

        assert!(lifecycle.close());
        assert_eq!(lifecycle.identify(Some("userId=u1")), State::Closed);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_lifecycle_runs_teardown() {
        let (registry, lifecycle, _rx) = accept();
        lifecycle.identify(Some("userId=u1"));
        let handle = lifecycle.handle().clone();

        drop(lifecycle);

        assert!(registry.is_empty());
        assert!(handle.is_closed());
    }
}
