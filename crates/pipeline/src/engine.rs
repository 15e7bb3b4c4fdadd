//! Synthesis engine facade

use std::sync::Arc;
use std::time::Duration;

use tts_proxy_config::Settings;
use tts_proxy_core::{Result, SentenceSegmenter, SynthesisRequest};
use tts_proxy_transport::TtsTransport;

use crate::probe::CapabilityProbe;
use crate::registry::BackendRegistry;
use crate::selector::BackendSelector;
use crate::session::{AudioStream, SynthesisSession};

/// Entry point for synthesis requests
///
/// Shared by all concurrent requests; each call runs an independent
/// session against the shared backend registry.
pub struct SynthesisEngine {
    registry: Arc<BackendRegistry>,
    selector: BackendSelector,
    probe: CapabilityProbe,
    segmenter: SentenceSegmenter,
    chunk_timeout: Duration,
    default_voice: String,
}

impl SynthesisEngine {
    pub fn new(transport: Arc<dyn TtsTransport>, settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let registry = Arc::new(BackendRegistry::from_config(&settings.backends)?);
        let synthesis = &settings.synthesis;

        Ok(Self {
            selector: BackendSelector::new(
                transport,
                Arc::clone(&registry),
                synthesis.liveness_timeout(),
            ),
            probe: CapabilityProbe::from_config(synthesis),
            segmenter: SentenceSegmenter::with_max_chars(synthesis.max_sentence_chars),
            chunk_timeout: synthesis.chunk_timeout(),
            default_voice: synthesis.default_voice.clone(),
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Contact every backend and cache its voices
    pub async fn refresh_backends(&self) {
        self.selector.refresh_all().await
    }

    /// Start synthesizing `request`
    ///
    /// Invalid requests and unreachable backends fail here, before any
    /// audio. Failures after the first chunk arrive as the stream's last item.
    pub async fn synthesize(&self, request: SynthesisRequest) -> Result<AudioStream> {
        if let Err(e) = self.registry.validate_voice(request.voice_id()) {
            tracing::warn!(voice = request.voice_id(), error = %e, "Rejected synthesis request");
            return Err(e);
        }

        SynthesisSession {
            registry: &self.registry,
            selector: &self.selector,
            probe: &self.probe,
            segmenter: &self.segmenter,
            chunk_timeout: self.chunk_timeout,
        }
        .start(request)
        .await
    }
}
