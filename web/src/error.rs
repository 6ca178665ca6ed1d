use std::error::Error as StdError;
use std::fmt;

use axum::http::header::InvalidHeaderValue;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while wiring the relay onto a listener. Nothing past the
/// upgrade ever surfaces here: per-connection failures are logged and stay local.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// A configuration value could not be turned into what the router needs.
    Config,
    /// Binding or serving the listener failed.
    Io,
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(fmt, "Web Error: {:?} ({source})", self.error_kind),
            None => write!(fmt, "Web Error: {:?}", self.error_kind),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Io,
        }
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(err: InvalidHeaderValue) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Config,
        }
    }
}
