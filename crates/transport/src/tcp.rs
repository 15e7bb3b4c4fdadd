//! TCP transport

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use tts_proxy_core::{AudioFormat, VoiceCatalog, VoiceSelection};

use crate::messages::{self, Info};
use crate::traits::{AudioFrame, BackendAddress, TtsConnection, TtsTransport};
use crate::{read_event, write_event, Event, TransportError};

/// Plain TCP connections, one per session
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TtsTransport for TcpTransport {
    async fn connect(
        &self,
        address: &BackendAddress,
    ) -> Result<Box<dyn TtsConnection>, TransportError> {
        let stream = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        tracing::debug!(address = %address, "Connected to TTS backend");

        Ok(Box::new(TcpConnection::new(address.clone(), stream)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    /// `synthesize`; ends at `audio-stop`
    OneShot,
    /// `synthesize-start`; ends at `synthesize-stopped`
    Streaming,
}

/// One TCP connection to a backend
pub struct TcpConnection {
    address: BackendAddress,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    mode: Mode,
    format: Option<AudioFormat>,
    closed: bool,
}

impl TcpConnection {
    pub fn new(address: BackendAddress, stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            address,
            reader: BufReader::new(read_half),
            writer: write_half,
            mode: Mode::Idle,
            format: None,
            closed: false,
        }
    }

    async fn send(&mut self, event: &Event) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        write_event(&mut self.writer, event).await
    }

    async fn receive(&mut self) -> Result<Event, TransportError> {
        match read_event(&mut self.reader).await? {
            Some(event) => Ok(event),
            None => {
                self.closed = true;
                Err(TransportError::Closed)
            }
        }
    }

    fn begin(&mut self, mode: Mode) -> Result<(), TransportError> {
        if self.mode != Mode::Idle {
            return Err(TransportError::Protocol(
                "synthesis already in progress".to_string(),
            ));
        }
        self.mode = mode;
        self.format = None;
        Ok(())
    }
}

#[async_trait]
impl TtsConnection for TcpConnection {
    fn address(&self) -> &BackendAddress {
        &self.address
    }

    async fn describe(&mut self) -> Result<VoiceCatalog, TransportError> {
        if self.mode != Mode::Idle {
            return Err(TransportError::Protocol(
                "describe during synthesis".to_string(),
            ));
        }
        self.send(&messages::describe()).await?;

        loop {
            let event = self.receive().await?;
            if event.is(messages::INFO) {
                return Ok(Info::from_event(&event)?.into_catalog());
            }
            if event.is(messages::ERROR) {
                return Err(messages::backend_error(&event));
            }
            tracing::trace!(event = %event.event_type, "Ignoring event while waiting for info");
        }
    }

    async fn start_synthesis(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> Result<(), TransportError> {
        self.begin(Mode::OneShot)?;
        let sent = self.send(&messages::synthesize(text, voice)).await;
        if sent.is_err() {
            self.mode = Mode::Idle;
        }
        sent
    }

    async fn start_streaming_synthesis(
        &mut self,
        voice: &VoiceSelection,
        text: &str,
    ) -> Result<(), TransportError> {
        self.begin(Mode::Streaming)?;
        let sent = async {
            self.send(&messages::synthesize_start(voice)).await?;
            self.send(&messages::synthesize_chunk(text)).await?;
            self.send(&messages::synthesize_stop()).await
        }
        .await;
        if sent.is_err() {
            self.mode = Mode::Idle;
        }
        sent
    }

    async fn next_audio(&mut self) -> Result<AudioFrame, TransportError> {
        if self.mode == Mode::Idle {
            return Err(TransportError::Protocol("no synthesis in progress".to_string()));
        }

        loop {
            let event = match self.receive().await {
                Ok(event) => event,
                Err(e) => {
                    self.mode = Mode::Idle;
                    return Err(e);
                }
            };

            match event.event_type.as_str() {
                messages::AUDIO_START | messages::AUDIO_CHUNK => {
                    match messages::audio_format(&event) {
                        Ok(Some(format)) => self.format = Some(format),
                        Ok(None) => {}
                        Err(e) => {
                            self.mode = Mode::Idle;
                            return Err(e);
                        }
                    }
                    if event.is(messages::AUDIO_START) {
                        continue;
                    }
                    let data = messages::audio_payload(&event);
                    if data.is_empty() {
                        continue;
                    }
                    return Ok(AudioFrame::Chunk {
                        format: self.format,
                        data,
                    });
                }
                messages::AUDIO_STOP if self.mode == Mode::OneShot => {
                    self.mode = Mode::Idle;
                    return Ok(AudioFrame::End);
                }
                // Streaming backends close each inner sentence with audio-stop
                messages::AUDIO_STOP => {}
                messages::SYNTHESIZE_STOPPED if self.mode == Mode::Streaming => {
                    self.mode = Mode::Idle;
                    return Ok(AudioFrame::End);
                }
                messages::SYNTHESIZE_STOPPED => {}
                messages::ERROR => {
                    self.mode = Mode::Idle;
                    return Err(messages::backend_error(&event));
                }
                other => {
                    self.mode = Mode::Idle;
                    return Err(TransportError::Malformed(format!(
                        "unexpected {} event during synthesis",
                        other
                    )));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.mode = Mode::Idle;
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(address = %self.address, error = %e, "Error shutting down connection");
        }
    }
}
