//! Scripted in-memory backends

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tts_proxy_config::{BackendConfig, Settings};
use tts_proxy_core::{AudioFormat, VoiceCapabilities, VoiceCatalog, VoiceSelection};
use tts_proxy_pipeline::SynthesisEngine;
use tts_proxy_transport::{
    AudioFrame, BackendAddress, TransportError, TtsConnection, TtsTransport,
};

pub const PRIMARY: (&str, u16) = ("tts-primary", 10200);
pub const FALLBACK: (&str, u16) = ("tts-fallback", 10200);

/// Ordered record of everything backends saw, plus what the test consumed
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Debug, Clone)]
pub struct MockBackend {
    pub reachable: bool,
    pub catalog: VoiceCatalog,
    pub chunks_per_request: usize,
    /// Describe calls beyond this many fail
    pub describe_limit: Option<usize>,
    /// Describe never answers
    pub describe_stalls: bool,
    /// Connection drops once this many synthesis requests completed
    pub disconnect_after: Option<usize>,
    /// next_audio never answers
    pub audio_stalls: bool,
}

impl MockBackend {
    pub fn up(streaming: bool) -> Self {
        Self {
            reachable: true,
            catalog: VoiceCatalog::new().with_voice(
                "amy",
                VoiceCapabilities {
                    streaming,
                    languages: vec!["en_US".to_string()],
                    speakers: vec![],
                },
            ),
            chunks_per_request: 2,
            describe_limit: None,
            describe_stalls: false,
            disconnect_after: None,
            audio_stalls: false,
        }
    }

    pub fn down() -> Self {
        Self {
            reachable: false,
            ..Self::up(false)
        }
    }
}

#[derive(Default)]
pub struct MockTransport {
    backends: HashMap<BackendAddress, MockBackend>,
    pub log: CallLog,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, (host, port): (&str, u16), backend: MockBackend) -> Self {
        self.backends.insert(BackendAddress::new(host, port), backend);
        self
    }
}

#[async_trait]
impl TtsTransport for MockTransport {
    async fn connect(
        &self,
        address: &BackendAddress,
    ) -> Result<Box<dyn TtsConnection>, TransportError> {
        self.log.push(format!("connect {}", address));
        match self.backends.get(address) {
            Some(backend) if backend.reachable => Ok(Box::new(MockConnection {
                address: address.clone(),
                backend: backend.clone(),
                log: self.log.clone(),
                pending: VecDeque::new(),
                describes: 0,
                completed: 0,
            })),
            _ => Err(TransportError::Connect {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

pub struct MockConnection {
    address: BackendAddress,
    backend: MockBackend,
    log: CallLog,
    pending: VecDeque<AudioFrame>,
    describes: usize,
    completed: usize,
}

impl MockConnection {
    fn queue(&mut self, text: &str) {
        let format = Some(AudioFormat::new(22050, 2, 1));
        for i in 0..self.backend.chunks_per_request {
            self.pending.push_back(AudioFrame::Chunk {
                format,
                data: Bytes::from(format!("{}#{}", text, i)),
            });
        }
        self.pending.push_back(AudioFrame::End);
    }

    fn dropped(&self) -> bool {
        self.backend
            .disconnect_after
            .is_some_and(|limit| self.completed >= limit)
    }
}

#[async_trait]
impl TtsConnection for MockConnection {
    fn address(&self) -> &BackendAddress {
        &self.address
    }

    async fn describe(&mut self) -> Result<VoiceCatalog, TransportError> {
        self.describes += 1;
        self.log.push(format!("describe {}", self.address));
        if self.backend.describe_stalls {
            futures::future::pending::<()>().await;
        }
        if self
            .backend
            .describe_limit
            .is_some_and(|limit| self.describes > limit)
        {
            return Err(TransportError::Closed);
        }
        Ok(self.backend.catalog.clone())
    }

    async fn start_synthesis(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> Result<(), TransportError> {
        self.log.push(format!("synthesize {} {} {}", self.address, voice, text));
        if self.dropped() {
            return Err(TransportError::Closed);
        }
        self.queue(text);
        Ok(())
    }

    async fn start_streaming_synthesis(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> Result<(), TransportError> {
        self.log.push(format!("stream {} {} {}", self.address, voice, text));
        self.queue(text);
        Ok(())
    }

    async fn next_audio(&mut self) -> Result<AudioFrame, TransportError> {
        if self.backend.audio_stalls {
            futures::future::pending::<()>().await;
        }
        if self.dropped() {
            return Err(TransportError::Closed);
        }
        match self.pending.pop_front() {
            Some(AudioFrame::End) => {
                self.completed += 1;
                Ok(AudioFrame::End)
            }
            Some(frame) => Ok(frame),
            None => Err(TransportError::Protocol("no synthesis in progress".to_string())),
        }
    }

    async fn close(&mut self) {
        self.log.push(format!("close {}", self.address));
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.log.push(format!("drop {}", self.address));
    }
}

pub fn settings(primary: bool, fallback: bool) -> Settings {
    let mut settings = Settings::default();
    settings.backends.primary = primary.then(|| BackendConfig::new(PRIMARY.0, PRIMARY.1));
    settings.backends.fallback = fallback.then(|| BackendConfig::new(FALLBACK.0, FALLBACK.1));
    settings.synthesis.liveness_timeout_ms = 100;
    settings.synthesis.chunk_timeout_ms = 200;
    settings
}

pub fn engine(transport: MockTransport, settings: &Settings) -> (SynthesisEngine, CallLog) {
    let log = transport.log.clone();
    let engine = SynthesisEngine::new(Arc::new(transport), settings).unwrap();
    (engine, log)
}

/// Let spawned registry refreshes run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
