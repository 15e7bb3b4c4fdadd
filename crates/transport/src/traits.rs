//! Transport traits
//!
//! The pipeline only talks to backends through these; tests substitute
//! in-memory implementations.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use tts_proxy_core::{AudioFormat, VoiceCatalog, VoiceSelection};

use crate::TransportError;

/// host:port of a backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendAddress {
    pub host: String,
    pub port: u16,
}

impl BackendAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One step of a synthesis response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFrame {
    /// Audio bytes with the format the backend last announced
    Chunk {
        format: Option<AudioFormat>,
        data: Bytes,
    },
    /// The backend finished the current synthesis
    End,
}

/// Opens connections to backends
#[async_trait]
pub trait TtsTransport: Send + Sync {
    async fn connect(
        &self,
        address: &BackendAddress,
    ) -> Result<Box<dyn TtsConnection>, TransportError>;
}

/// An open connection to one backend
///
/// A connection runs at most one synthesis at a time. After `End` it may
/// be reused for the next one.
#[async_trait]
pub trait TtsConnection: Send {
    fn address(&self) -> &BackendAddress;

    /// Ask the backend for its installed voices
    async fn describe(&mut self) -> Result<VoiceCatalog, TransportError>;

    /// One-shot synthesis of a complete text
    async fn start_synthesis(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Incremental synthesis; the full text is sent as one chunk followed
    /// by the stop marker, audio flows back as the backend produces it
    async fn start_streaming_synthesis(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Next piece of audio for the synthesis in progress
    async fn next_audio(&mut self) -> Result<AudioFrame, TransportError>;

    async fn close(&mut self);
}
