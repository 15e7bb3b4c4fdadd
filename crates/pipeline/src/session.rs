//! Synthesis sessions
//!
//! ```text
//! SELECTING ─┬─> NATIVE_STREAMING ─┬─> DELIVERING ─┬─> COMPLETED
//!            └─> SEGMENTED ────────┘               └─> FAILED
//! ```
//!
//! A session owns one backend connection from selection to its terminal
//! state. Audio is pulled by the consumer: nothing is requested from the
//! backend until the previous chunk has been taken, and dropping the
//! stream drops the connection.

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use uuid::Uuid;

use tts_proxy_core::{
    AudioChunk, AudioFormat, Error, Result, SentenceSegmenter, SynthesisRequest, VoiceSelection,
};
use tts_proxy_transport::{AudioFrame, TransportError, TtsConnection};

use crate::metrics;
use crate::probe::CapabilityProbe;
use crate::registry::{BackendDescriptor, BackendRegistry};
use crate::selector::{BackendSelector, Reachable};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Selecting,
    NativeStreaming,
    Segmented,
    Delivering,
    Completed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Selecting => "selecting",
            SessionState::NativeStreaming => "native_streaming",
            SessionState::Segmented => "segmented",
            SessionState::Delivering => "delivering",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// How audio is produced for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPath {
    /// Whole text sent once over the incremental protocol
    NativeStreaming,
    /// One synthesize request per sentence, strictly in order
    Segmented,
}

impl SynthesisPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisPath::NativeStreaming => "native_streaming",
            SynthesisPath::Segmented => "segmented",
        }
    }

    fn state(&self) -> SessionState {
        match self {
            SynthesisPath::NativeStreaming => SessionState::NativeStreaming,
            SynthesisPath::Segmented => SessionState::Segmented,
        }
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send>>;

/// Ordered audio of one session
///
/// Yields data chunks, then either a single empty chunk with `is_final`
/// set (completed) or one `Err` (failed). Nothing follows either.
pub struct AudioStream {
    session_id: Uuid,
    backend: Arc<BackendDescriptor>,
    path: SynthesisPath,
    state: Arc<Mutex<SessionState>>,
    inner: ChunkStream,
}

impl AudioStream {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Backend chosen for this session
    pub fn backend(&self) -> &Arc<BackendDescriptor> {
        &self.backend
    }

    pub fn path(&self) -> SynthesisPath {
        self.path
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }
}

impl Stream for AudioStream {
    type Item = Result<AudioChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("session_id", &self.session_id)
            .field("backend", &self.backend.address)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything a session needs from the engine
pub struct SynthesisSession<'a> {
    pub registry: &'a Arc<BackendRegistry>,
    pub selector: &'a BackendSelector,
    pub probe: &'a CapabilityProbe,
    pub segmenter: &'a SentenceSegmenter,
    pub chunk_timeout: Duration,
}

impl SynthesisSession<'_> {
    /// Run SELECTING and the capability probe, then hand back the stream
    ///
    /// Fails eagerly with `DefinitiveFailure` when no backend is reachable.
    pub async fn start(&self, request: SynthesisRequest) -> Result<AudioStream> {
        let session_id = Uuid::new_v4();
        let started = Instant::now();
        let state = Arc::new(Mutex::new(SessionState::Selecting));

        tracing::debug!(
            session_id = %session_id,
            voice = request.voice_id(),
            chars = request.text().len(),
            "Starting synthesis session"
        );

        let reachable = match self.selector.select().await {
            Ok(reachable) => reachable,
            Err(e) => {
                *state.lock() = SessionState::Failed;
                tracing::warn!(session_id = %session_id, error = %e, "Session failed during selection");
                return Err(e);
            }
        };

        let Reachable {
            descriptor: backend,
            voices,
            mut connection,
        } = reachable;
        let voice_id = backend.voice_for(request.voice_id()).to_string();

        let capability = self
            .probe
            .supports_streaming(
                self.registry,
                &backend,
                voices.as_ref(),
                connection.as_mut(),
                &voice_id,
            )
            .await;
        if capability.needs_reconnect {
            connection.close().await;
            connection = match self.selector.reconnect(&backend).await {
                Ok(connection) => connection,
                Err(e) => {
                    *state.lock() = SessionState::Failed;
                    tracing::warn!(session_id = %session_id, error = %e, "Session failed to reconnect");
                    return Err(e);
                }
            };
        }
        let path = if capability.streaming {
            SynthesisPath::NativeStreaming
        } else {
            SynthesisPath::Segmented
        };
        *state.lock() = path.state();

        metrics::record_session_started();
        metrics::record_path(path.as_str());
        tracing::info!(
            session_id = %session_id,
            backend = %backend.address,
            role = %backend.role,
            voice = %voice_id,
            path = path.as_str(),
            "Synthesis session started"
        );

        let driver = Driver {
            session_id,
            address: backend.address.to_string(),
            connection,
            state: Arc::clone(&state),
            chunk_timeout: self.chunk_timeout,
            expected_format: request.format(),
            format_warned: false,
            sequence: 0,
            started,
            finished: false,
        };
        let voice = VoiceSelection::parse(&voice_id);
        let inner = match path {
            SynthesisPath::NativeStreaming => native(driver, voice, request),
            SynthesisPath::Segmented => segmented(driver, voice, request, *self.segmenter),
        };

        Ok(AudioStream {
            session_id,
            backend,
            path,
            state,
            inner,
        })
    }
}

fn native(mut driver: Driver, voice: VoiceSelection, request: SynthesisRequest) -> ChunkStream {
    Box::pin(async_stream::stream! {
        if let Err(e) = driver.start_streaming(&voice, request.text()).await {
            yield Err(driver.fail(e).await);
            return;
        }
        loop {
            match driver.next_frame().await {
                Ok(AudioFrame::Chunk { format, data }) => yield Ok(driver.chunk(format, data)),
                Ok(AudioFrame::End) => break,
                Err(e) => {
                    yield Err(driver.fail(e).await);
                    return;
                }
            }
        }
        yield Ok(driver.complete().await);
    })
}

fn segmented(
    mut driver: Driver,
    voice: VoiceSelection,
    request: SynthesisRequest,
    segmenter: SentenceSegmenter,
) -> ChunkStream {
    Box::pin(async_stream::stream! {
        for sentence in segmenter.sentences(request.text()) {
            if !sentence.is_speakable() {
                tracing::debug!(
                    session_id = %driver.session_id,
                    index = sentence.index,
                    "Skipping sentence without speakable text"
                );
                continue;
            }
            tracing::debug!(
                session_id = %driver.session_id,
                index = sentence.index,
                "Synthesizing sentence"
            );
            if let Err(e) = driver.start_sentence(&voice, &sentence.text).await {
                yield Err(driver.fail(e).await);
                return;
            }
            loop {
                match driver.next_frame().await {
                    Ok(AudioFrame::Chunk { format, data }) => yield Ok(driver.chunk(format, data)),
                    Ok(AudioFrame::End) => break,
                    Err(e) => {
                        yield Err(driver.fail(e).await);
                        return;
                    }
                }
            }
        }
        yield Ok(driver.complete().await);
    })
}

/// Why a post-commit wait ended badly
enum Interruption {
    Transport(TransportError),
    Inactive(Duration),
}

impl From<TransportError> for Interruption {
    fn from(err: TransportError) -> Self {
        Interruption::Transport(err)
    }
}

/// Connection plus delivery bookkeeping, owned by the chunk generator
struct Driver {
    session_id: Uuid,
    address: String,
    connection: Box<dyn TtsConnection>,
    state: Arc<Mutex<SessionState>>,
    chunk_timeout: Duration,
    expected_format: Option<AudioFormat>,
    format_warned: bool,
    sequence: u64,
    started: Instant,
    finished: bool,
}

impl Driver {
    async fn start_streaming(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> std::result::Result<(), Interruption> {
        let send = self.connection.start_streaming_synthesis(voice, text);
        match tokio::time::timeout(self.chunk_timeout, send).await {
            Ok(sent) => Ok(sent?),
            Err(_) => Err(Interruption::Inactive(self.chunk_timeout)),
        }
    }

    async fn start_sentence(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> std::result::Result<(), Interruption> {
        let send = self.connection.start_synthesis(voice, text);
        match tokio::time::timeout(self.chunk_timeout, send).await {
            Ok(sent) => Ok(sent?),
            Err(_) => Err(Interruption::Inactive(self.chunk_timeout)),
        }
    }

    async fn next_frame(&mut self) -> std::result::Result<AudioFrame, Interruption> {
        match tokio::time::timeout(self.chunk_timeout, self.connection.next_audio()).await {
            Ok(frame) => Ok(frame?),
            Err(_) => Err(Interruption::Inactive(self.chunk_timeout)),
        }
    }

    fn chunk(&mut self, format: Option<AudioFormat>, data: Bytes) -> AudioChunk {
        if self.sequence == 0 {
            *self.state.lock() = SessionState::Delivering;
            let latency = self.started.elapsed();
            metrics::record_first_chunk_latency(latency.as_secs_f64());
            tracing::debug!(
                session_id = %self.session_id,
                latency_ms = latency.as_millis() as u64,
                "First audio chunk"
            );
        }
        self.check_format(format);
        metrics::record_chunk(data.len());

        let chunk = AudioChunk::data(self.sequence, data, format);
        self.sequence += 1;
        chunk
    }

    fn check_format(&mut self, format: Option<AudioFormat>) {
        if self.format_warned {
            return;
        }
        if let (Some(expected), Some(actual)) = (self.expected_format, format) {
            if expected != actual {
                self.format_warned = true;
                tracing::warn!(
                    session_id = %self.session_id,
                    expected = ?expected,
                    actual = ?actual,
                    "Backend audio format differs from the requested one; forwarding unchanged"
                );
            }
        }
    }

    async fn complete(&mut self) -> AudioChunk {
        self.finished = true;
        *self.state.lock() = SessionState::Completed;
        self.connection.close().await;
        metrics::record_session_finished("completed");
        tracing::info!(
            session_id = %self.session_id,
            chunks = self.sequence,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Synthesis session completed"
        );
        AudioChunk::terminal(self.sequence)
    }

    async fn fail(&mut self, interruption: Interruption) -> Error {
        let delivered = self.sequence;
        let address = self.address.clone();
        let err = match interruption {
            Interruption::Transport(e) if e.is_malformed() || matches!(e, TransportError::Protocol(_)) => {
                Error::MalformedResponse {
                    address,
                    delivered,
                    reason: e.to_string(),
                }
            }
            Interruption::Transport(e) => Error::MidStreamFailure {
                address,
                delivered,
                reason: e.to_string(),
            },
            Interruption::Inactive(timeout) => Error::MidStreamFailure {
                address,
                delivered,
                reason: format!("no audio for {}ms", timeout.as_millis()),
            },
        };

        self.finished = true;
        *self.state.lock() = SessionState::Failed;
        self.connection.close().await;
        metrics::record_session_finished("failed");
        tracing::error!(
            session_id = %self.session_id,
            backend = %self.address,
            delivered,
            error = %err,
            "Synthesis session failed"
        );
        err
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if !self.finished {
            metrics::record_session_finished("cancelled");
            tracing::debug!(
                session_id = %self.session_id,
                delivered = self.sequence,
                "Synthesis session cancelled"
            );
        }
    }
}
