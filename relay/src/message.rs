use crate::connection::UserId;
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Text of the acknowledgement pushed to a client once it is registered.
pub const CONNECTED_MESSAGE: &str = "Connected to notification service";

/// A notification produced by business logic. Immutable once built.
///
/// Payload fields are flattened next to `title` and `created_at` on the wire,
/// so `{"title": "Booked", "booking_id": 7}` reaches the client as one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    title: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
    created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_payload(title, Value::Null)
    }

    /// Objects are flattened as-is; any other non-null value is kept under `body`.
    pub fn with_payload(title: impl Into<String>, payload: Value) -> Self {
        let mut payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("body".to_string(), other);
                map
            }
        };
        // Reserved keys would collide with the flattened fields
        payload.remove("title");
        payload.remove("created_at");

        Self {
            title: title.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

/// The unit written to a connection, tagged by `type`. Built fresh per send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope<'a> {
    Connection {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Notification {
        notification: &'a Notification,
        timestamp: DateTime<Utc>,
    },
}

impl<'a> Envelope<'a> {
    pub fn connection(message: impl Into<String>) -> Self {
        Envelope::Connection {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn notification(notification: &'a Notification) -> Self {
        Envelope::Notification {
            notification,
            timestamp: Utc::now(),
        }
    }

    pub fn to_frame(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub notification: Notification,
    pub scope: MessageScope,
}

#[derive(Debug, Clone)]
pub enum MessageScope {
    /// Send to the connection registered for a specific user
    User { user_id: UserId },
    /// Send to all connected users
    Broadcast,
}
