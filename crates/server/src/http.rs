//! HTTP Endpoints
//!
//! - `POST /api/tts`: streamed WAV
//! - `POST /api/tts/complete`: buffered WAV
//! - `GET /api/voices`: cached voices per backend

use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tts_proxy_core::{AudioFormat, BackendRole, SynthesisRequest, VoiceCatalog};
use tts_proxy_pipeline::{AudioStream, BackendDescriptor};

use crate::metrics::{metrics_handler, record_http_error, record_request};
use crate::state::AppState;
use crate::wav;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        // Synthesis
        .route("/api/tts", post(synthesize_streaming))
        .route("/api/tts/complete", post(synthesize_complete))
        .route("/api/voices", get(list_voices))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http());

    let router = if state.config.server.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

/// Synthesis request body
#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    /// `name` or `name:speaker`; the configured default when absent
    #[serde(default)]
    pub voice: Option<String>,
    /// Expected output format; advisory, audio is never resampled
    #[serde(default)]
    pub format: Option<AudioFormat>,
}

impl TtsRequest {
    /// Core request plus the format to frame the response with
    fn into_synthesis(
        self,
        state: &AppState,
    ) -> Result<(SynthesisRequest, AudioFormat), ServerError> {
        let voice = self
            .voice
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| state.engine.default_voice().to_string());

        let mut request = SynthesisRequest::new(self.text, voice)?;
        if let Some(format) = self.format {
            format
                .validate()
                .map_err(|reason| ServerError::InvalidRequest(format!("format: {}", reason)))?;
            request = request.with_format(format);
        }
        let format = self.format.unwrap_or(state.config.synthesis.default_format);
        Ok((request, format))
    }
}

async fn start(
    state: &AppState,
    request: TtsRequest,
    endpoint: &'static str,
) -> Result<(AudioStream, AudioFormat), ServerError> {
    record_request(endpoint);

    let started = async {
        let (request, format) = request.into_synthesis(state)?;
        let audio = state.engine.synthesize(request).await?;
        Ok::<_, ServerError>((audio, format))
    }
    .await;

    if let Err(e) = &started {
        record_http_error(endpoint, e.status());
        tracing::warn!(endpoint, error = %e, "Synthesis request failed");
    }
    started
}

fn session_headers(response: &mut Response, audio: &AudioStream) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&audio.session_id().to_string()) {
        headers.insert("x-tts-session", value);
    }
    if let Ok(value) = HeaderValue::from_str(&audio.backend().address.to_string()) {
        headers.insert("x-tts-backend", value);
    }
    headers.insert("x-tts-path", HeaderValue::from_static(audio.path().as_str()));
}

/// `POST /api/tts`: WAV header, then PCM as the backend produces it
///
/// A failure after the header aborts the body; the client sees a truncated
/// transfer rather than a status code.
async fn synthesize_streaming(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response, ServerError> {
    let (audio, format) = start(&state, request, "tts").await?;

    let mut response = Response::new(Body::empty());
    session_headers(&mut response, &audio);
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));

    let session_id = audio.session_id();
    let wav_header = stream::once(future::ready(Ok::<Bytes, std::io::Error>(
        wav::streaming_header(format),
    )));
    let pcm = audio.filter_map(move |item| {
        future::ready(match item {
            Ok(chunk) if chunk.is_final || chunk.is_empty() => None,
            Ok(chunk) => Some(Ok(chunk.payload)),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Aborting audio response");
                Some(Err(std::io::Error::other(e.to_string())))
            }
        })
    });

    *response.body_mut() = Body::from_stream(wav_header.chain(pcm));
    Ok(response)
}

/// `POST /api/tts/complete`: the whole utterance as one WAV file
async fn synthesize_complete(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response, ServerError> {
    let (mut audio, requested) = start(&state, request, "tts_complete").await?;

    let mut pcm = Vec::new();
    let mut format = None;
    while let Some(item) = audio.next().await {
        let chunk = item.map_err(|e| {
            let e = ServerError::from(e);
            record_http_error("tts_complete", e.status());
            e
        })?;
        if format.is_none() {
            format = chunk.format;
        }
        pcm.extend_from_slice(&chunk.payload);
    }

    let format = format.unwrap_or(requested);
    let body = wav::encode(format, &pcm)
        .map_err(|e| ServerError::Internal(format!("WAV encoding failed: {}", e)))?;

    let mut response = ([(header::CONTENT_TYPE, "audio/wav")], body).into_response();
    session_headers(&mut response, &audio);
    Ok(response)
}

/// One backend as reported by `/api/voices` and `/ready`
#[derive(Debug, Serialize)]
struct BackendStatus {
    role: BackendRole,
    address: String,
    reachable: bool,
    last_reachable: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_override: Option<String>,
    voices: Option<VoiceCatalog>,
}

impl From<&BackendDescriptor> for BackendStatus {
    fn from(descriptor: &BackendDescriptor) -> Self {
        Self {
            role: descriptor.role,
            address: descriptor.address.to_string(),
            reachable: descriptor.is_reachable(),
            last_reachable: descriptor.last_reachable,
            last_failure: descriptor.last_failure,
            voice_override: descriptor.voice_override.clone(),
            voices: descriptor.voices.as_deref().cloned(),
        }
    }
}

fn backend_statuses(state: &AppState) -> Vec<BackendStatus> {
    state
        .engine
        .registry()
        .snapshot()
        .iter()
        .map(|d| BackendStatus::from(d.as_ref()))
        .collect()
}

/// List cached voices per backend
async fn list_voices(State(state): State<AppState>) -> Json<serde_json::Value> {
    record_request("voices");
    Json(serde_json::json!({
        "default_voice": state.engine.default_voice(),
        "backends": backend_statuses(&state),
    }))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once a backend answered at its last contact
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let backends = backend_statuses(&state);
    let ready = backends.iter().any(|b| b.reachable);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "unavailable" },
            "backends": backends,
        })),
    )
}
