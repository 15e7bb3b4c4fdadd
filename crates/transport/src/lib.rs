//! Transport to wire-protocol TTS backends
//!
//! The wire protocol frames every event as a JSON header line, an optional
//! JSON data segment and an optional binary payload. This crate provides:
//! - `event`: framing codec over any async byte stream
//! - `messages`: the event types a TTS client needs
//! - `traits`: the connect / describe / synthesize / close seam the pipeline uses
//! - `tcp`: the TCP implementation of those traits

pub mod event;
pub mod messages;
pub mod tcp;
pub mod traits;

pub use event::{read_event, write_event, Event, PROTOCOL_VERSION};
pub use tcp::{TcpConnection, TcpTransport};
pub use traits::{AudioFrame, BackendAddress, TtsConnection, TtsTransport};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by backend")]
    Closed,

    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Backend error: {message}")]
    Backend {
        code: Option<String>,
        message: String,
    },

    #[error("Protocol misuse: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Unexpected data rather than a broken connection
    pub fn is_malformed(&self) -> bool {
        matches!(self, TransportError::Malformed(_))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Malformed(err.to_string())
    }
}
