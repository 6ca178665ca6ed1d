use config::Config;
use events::EventPublisher;
use relay::domain_event_handler::RelayEventHandler;
use relay::Manager;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub relay: Arc<Manager>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Builds the shared state around an explicitly owned relay. Domain events
    /// published through `event_publisher` are delivered by that relay.
    pub fn new(app_config: Config, relay: &Arc<Manager>) -> Self {
        let event_publisher =
            EventPublisher::new().with_handler(Arc::new(RelayEventHandler::new(Arc::clone(relay))));

        Self {
            config: app_config,
            relay: Arc::clone(relay),
            event_publisher,
        }
    }

    pub fn relay_ref(&self) -> &Manager {
        self.relay.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use events::DomainEvent;
    use relay::connection::{ConnectionHandle, Outbound};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_published_events_are_delivered_through_the_relay() {
        let config = Config::parse_from(["notification_relay"]);
        let relay = Arc::new(Manager::new());
        let app_state = AppState::new(config, &relay);

        let (handle, mut rx) = ConnectionHandle::channel();
        app_state
            .relay_ref()
            .registry()
            .register("u1".to_string(), handle);

        app_state
            .event_publisher
            .publish(DomainEvent::UserNotified {
                user_id: "u1".to_string(),
                title: "Booking confirmed".to_string(),
                payload: json!({ "booking_id": 3 }),
            })
            .await;

        let Ok(Outbound::Text(frame)) = rx.try_recv() else {
            panic!("expected a notification frame");
        };
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["notification"]["title"], "Booking confirmed");
        assert_eq!(value["notification"]["booking_id"], 3);
    }
}
