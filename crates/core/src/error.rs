//! Error taxonomy
//!
//! Errors before a backend is committed are either recovered by failover or
//! surface as `DefinitiveFailure`. Errors after commit surface as-is and are
//! never retried on another backend within the same request.

use thiserror::Error;

use crate::BackendRole;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend {role} ({address}) unavailable: {reason}")]
    BackendUnavailable {
        role: BackendRole,
        address: String,
        reason: String,
    },

    #[error("Capability query to {address} failed: {reason}")]
    CapabilityQueryFailed { address: String, reason: String },

    #[error("No TTS backend available: {}", .attempts.join("; "))]
    DefinitiveFailure { attempts: Vec<String> },

    #[error("Backend {address} failed after {delivered} chunks: {reason}")]
    MidStreamFailure {
        address: String,
        delivered: u64,
        reason: String,
    },

    #[error("Malformed response from {address} after {delivered} chunks: {reason}")]
    MalformedResponse {
        address: String,
        delivered: u64,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What the caller should make of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSignal {
    /// Rejected before any backend contact
    Rejected,
    /// No backend could be reached; retrying later may succeed
    ServiceUnavailable,
    /// Stream ended abnormally after audio started flowing
    Interrupted,
}

impl Error {
    pub fn signal(&self) -> FailureSignal {
        match self {
            Error::InvalidRequest(_) | Error::Config(_) => FailureSignal::Rejected,
            Error::BackendUnavailable { .. }
            | Error::CapabilityQueryFailed { .. }
            | Error::DefinitiveFailure { .. } => FailureSignal::ServiceUnavailable,
            Error::MidStreamFailure { .. } | Error::MalformedResponse { .. } => {
                FailureSignal::Interrupted
            }
        }
    }

    /// Whether re-issuing the whole request later is worthwhile
    pub fn is_retryable(&self) -> bool {
        self.signal() == FailureSignal::ServiceUnavailable
    }

    /// Chunks already delivered before the failure
    pub fn delivered_chunks(&self) -> u64 {
        match self {
            Error::MidStreamFailure { delivered, .. } | Error::MalformedResponse { delivered, .. } => {
                *delivered
            }
            _ => 0,
        }
    }
}
