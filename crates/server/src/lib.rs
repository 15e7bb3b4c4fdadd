//! Streaming TTS proxy server
//!
//! HTTP endpoints in front of the synthesis engine.

pub mod http;
pub mod metrics;
pub mod state;
pub mod wav;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use tts_proxy_core::FailureSignal;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Synthesis interrupted: {0}")]
    Interrupted(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tts_proxy_core::Error> for ServerError {
    fn from(err: tts_proxy_core::Error) -> Self {
        match err.signal() {
            FailureSignal::Rejected => ServerError::InvalidRequest(err.to_string()),
            FailureSignal::ServiceUnavailable => ServerError::Unavailable(err.to_string()),
            FailureSignal::Interrupted => ServerError::Interrupted(err.to_string()),
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Interrupted(_) => StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
