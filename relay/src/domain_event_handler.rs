use crate::message::{Message as RelayMessage, MessageScope, Notification};
use crate::Manager;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles domain events by turning them into notifications and pushing them
/// through the relay.
///
/// Producers decide who should hear about an event; this handler only routes.
/// Offline recipients are logged at debug level and otherwise ignored.
pub struct RelayEventHandler {
    manager: Arc<Manager>,
}

impl RelayEventHandler {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }

    fn to_message(event: &DomainEvent) -> RelayMessage {
        match event {
            DomainEvent::UserNotified {
                user_id,
                title,
                payload,
            } => RelayMessage {
                notification: Notification::with_payload(title.clone(), payload.clone()),
                scope: MessageScope::User {
                    user_id: user_id.clone(),
                },
            },
            DomainEvent::AllUsersNotified { title, payload } => RelayMessage {
                notification: Notification::with_payload(title.clone(), payload.clone()),
                scope: MessageScope::Broadcast,
            },
        }
    }
}

#[async_trait]
impl EventHandler for RelayEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let message = Self::to_message(event);
        let title = message.notification.title().to_string();
        let delivered = self.manager.send_message(message);

        debug!("Relayed \"{title}\" to {delivered} connection(s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionHandle, Outbound};
    use events::EventPublisher;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn published_events_reach_connected_users() {
        let manager = Arc::new(Manager::new());
        let (alice, mut alice_rx) = ConnectionHandle::channel();
        let (bob, mut bob_rx) = ConnectionHandle::channel();
        manager.registry().register("alice".to_string(), alice);
        manager.registry().register("bob".to_string(), bob);

        let publisher =
            EventPublisher::new().with_handler(Arc::new(RelayEventHandler::new(manager.clone())));

        publisher
            .publish(DomainEvent::UserNotified {
                user_id: "alice".to_string(),
                title: "Booking confirmed".to_string(),
                payload: json!({ "booking_id": 17 }),
            })
            .await;
        publisher
            .publish(DomainEvent::AllUsersNotified {
                title: "Maintenance tonight".to_string(),
                payload: Value::Null,
            })
            .await;

        let titles = |rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>| {
            let mut titles = Vec::new();
            while let Ok(Outbound::Text(text)) = rx.try_recv() {
                let value: Value = serde_json::from_str(&text).unwrap();
                titles.push(value["notification"]["title"].as_str().unwrap().to_string());
            }
            titles
        };

        assert_eq!(
            titles(&mut alice_rx),
            vec!["Booking confirmed", "Maintenance tonight"]
        );
        assert_eq!(titles(&mut bob_rx), vec!["Maintenance tonight"]);
    }

    #[tokio::test]
    async fn events_for_offline_users_are_dropped() {
        let manager = Arc::new(Manager::new());
        let handler = RelayEventHandler::new(manager.clone());

        handler
            .handle(&DomainEvent::UserNotified {
                user_id: "offline".to_string(),
                title: "Nobody home".to_string(),
                payload: Value::Null,
            })
            .await;

        assert!(manager.registry().is_empty());
    }
}
