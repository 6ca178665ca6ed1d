use crate::connection::{ConnectionHandle, ConnectionId, UserId};
use dashmap::DashMap;
use log::*;

/// Maps each user identity to its single live connection.
///
/// Mutation goes through `register`, `remove` and `release` only. DashMap
/// shard locks are held for the map operation itself; every read hands out a
/// cloned handle so no lock is ever held across a write to a connection.
pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Insert or replace the connection for `user_id`.
    ///
    /// A replaced connection is not closed here; its own lifecycle still owns it.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        let connection_id = handle.id().clone();
        if let Some(previous) = self.connections.insert(user_id.clone(), handle) {
            debug!(
                "Connection {} for user {} superseded by {}",
                previous.id(),
                user_id,
                connection_id
            );
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.connections.get(user_id).map(|entry| entry.value().clone())
    }

    /// Remove whatever connection is registered for `user_id`. No-op when absent.
    pub fn remove(&self, user_id: &str) {
        if let Some((_, handle)) = self.connections.remove(user_id) {
            debug!("Removed connection {} for user {}", handle.id(), user_id);
        }
    }

    /// Remove the entry for `user_id` only if it still points at `connection_id`.
    ///
    /// Returns `false` when the entry was already gone or has been replaced by a
    /// newer connection, which is then left untouched.
    pub fn release(&self, user_id: &str, connection_id: &ConnectionId) -> bool {
        self.connections
            .remove_if(user_id, |_, handle| handle.id() == connection_id)
            .is_some()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<(UserId, ConnectionHandle)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Visit every entry of a snapshot. The callback may freely register or
    /// remove entries; it never observes a half-applied mutation.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&UserId, &ConnectionHandle),
    {
        for (user_id, handle) in self.snapshot() {
            f(&user_id, &handle);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
