//! Error types for the `relay` crate.
//!
//! Follows the same pattern as the other workspace crates: a root Error struct
//! holding an error kind and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Kinds of failures a single send attempt can run into.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The envelope could not be encoded as JSON.
    Serialization,
    /// The connection was closed (locally or by the peer) before the write.
    ConnectionClosed,
}

impl Error {
    pub fn connection_closed() -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::ConnectionClosed,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Relay Error: {:?} ({source})", self.error_kind),
            None => write!(f, "Relay Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}
