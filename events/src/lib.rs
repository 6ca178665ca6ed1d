//! Event system infrastructure for the notification relay.
//!
//! This crate provides the event system that keeps business logic (bookings,
//! reminders, promotions) decoupled from the real-time delivery layer.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing every event that should reach users
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, so the producers of
//! events never depend on the relay. Notification bodies are carried as JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Identity of the user an event is addressed to, as supplied by the client
/// when it connected.
pub type UserId = String;

/// Domain events that should be pushed to connected users.
///
/// Delivery is best-effort: if the addressed user is offline the event is
/// dropped by the relay, and the producer remains responsible for any durable
/// record of it.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted when business logic has something to tell one user.
    UserNotified {
        /// Identity of the recipient.
        user_id: UserId,
        /// Short human readable headline.
        title: String,
        /// Additional fields; objects are flattened into the notification.
        payload: Value,
    },
    /// Emitted when every connected user should be told (announcements, sales).
    AllUsersNotified {
        /// Short human readable headline.
        title: String,
        /// Additional fields; objects are flattened into the notification.
        payload: Value,
    },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like sending notifications,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are called sequentially and own their failure handling.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        titles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            let title = match event {
                DomainEvent::UserNotified { title, .. } => title,
                DomainEvent::AllUsersNotified { title, .. } => title,
            };
            self.titles.lock().await.push(title.clone());
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_handler_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let publisher = EventPublisher::new()
            .with_handler(first.clone())
            .with_handler(second.clone());

        publisher
            .publish(DomainEvent::UserNotified {
                user_id: "u1".to_string(),
                title: "Booking confirmed".to_string(),
                payload: json!({ "booking_id": 1 }),
            })
            .await;
        publisher
            .publish(DomainEvent::AllUsersNotified {
                title: "Sale".to_string(),
                payload: Value::Null,
            })
            .await;

        assert_eq!(publisher.handler_count(), 2);
        for recorder in [first, second] {
            assert_eq!(
                *recorder.titles.lock().await,
                vec!["Booking confirmed".to_string(), "Sale".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn with_handler_leaves_original_publisher_untouched() {
        let base = EventPublisher::new();
        let extended = base.clone().with_handler(Arc::new(Recorder::default()));

        assert_eq!(base.handler_count(), 0);
        assert_eq!(extended.handler_count(), 1);
    }
}
