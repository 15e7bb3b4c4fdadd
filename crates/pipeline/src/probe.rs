//! Streaming capability negotiation

use std::collections::HashMap;
use std::time::Duration;

use tts_proxy_config::SynthesisConfig;
use tts_proxy_core::{VoiceCatalog, VoiceSelection};
use tts_proxy_transport::TtsConnection;

use crate::metrics;
use crate::registry::{BackendDescriptor, BackendRegistry};

/// Where a streaming answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilitySource {
    Override,
    /// Catalog fetched by this request's liveness check
    Handshake,
    Cache,
    Query,
    /// Query failed or the voice was not listed
    Unknown,
}

impl CapabilitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilitySource::Override => "override",
            CapabilitySource::Handshake => "handshake",
            CapabilitySource::Cache => "cache",
            CapabilitySource::Query => "query",
            CapabilitySource::Unknown => "unknown",
        }
    }
}

/// Outcome of capability negotiation for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub streaming: bool,
    pub source: CapabilitySource,
    /// The query over the session's connection was cut short; its framing
    /// can no longer be trusted
    pub needs_reconnect: bool,
}

impl Capability {
    fn known(streaming: bool, source: CapabilitySource) -> Self {
        Self {
            streaming,
            source,
            needs_reconnect: false,
        }
    }
}

/// Decides whether a backend streams a voice natively
///
/// Lookup order: configured override, the catalog the liveness check
/// fetched, the cached catalog, a just-in-time capability query over the
/// session's connection, then `false`.
#[derive(Debug, Clone)]
pub struct CapabilityProbe {
    /// Lowercased voice id → streaming
    overrides: HashMap<String, bool>,
    query_timeout: Duration,
}

impl CapabilityProbe {
    pub fn new(overrides: HashMap<String, bool>, query_timeout: Duration) -> Self {
        Self {
            overrides: overrides
                .into_iter()
                .map(|(voice, streaming)| (voice.to_lowercase(), streaming))
                .collect(),
            query_timeout,
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(config.streaming_overrides.clone(), config.liveness_timeout())
    }

    /// Override for the full id (`name:speaker`) first, then the bare name
    fn override_for(&self, voice_id: &str) -> Option<bool> {
        let full = voice_id.to_lowercase();
        if let Some(streaming) = self.overrides.get(&full) {
            return Some(*streaming);
        }
        let name = VoiceSelection::parse(&full).name;
        self.overrides.get(&name).copied()
    }

    /// `fetched` is the catalog from this request's liveness check; the
    /// connection is only queried when neither it nor the cache is known.
    pub async fn supports_streaming(
        &self,
        registry: &BackendRegistry,
        backend: &BackendDescriptor,
        fetched: Option<&VoiceCatalog>,
        connection: &mut dyn TtsConnection,
        voice_id: &str,
    ) -> Capability {
        let capability = self
            .resolve(registry, backend, fetched, connection, voice_id)
            .await;

        metrics::record_capability_source(capability.source.as_str());
        tracing::debug!(
            backend = %backend.address,
            voice = voice_id,
            streaming = capability.streaming,
            source = capability.source.as_str(),
            "Resolved streaming capability"
        );
        capability
    }

    async fn resolve(
        &self,
        registry: &BackendRegistry,
        backend: &BackendDescriptor,
        fetched: Option<&VoiceCatalog>,
        connection: &mut dyn TtsConnection,
        voice_id: &str,
    ) -> Capability {
        if let Some(streaming) = self.override_for(voice_id) {
            return Capability::known(streaming, CapabilitySource::Override);
        }

        let name = VoiceSelection::parse(voice_id).name;
        let lookup = |voices: &VoiceCatalog, source| match voices.get(&name) {
            Some(caps) => Capability::known(caps.streaming, source),
            None => Capability::known(false, CapabilitySource::Unknown),
        };

        if let Some(voices) = fetched {
            return lookup(voices, CapabilitySource::Handshake);
        }
        if let Some(voices) = &backend.voices {
            return lookup(voices, CapabilitySource::Cache);
        }

        // A failed or abandoned exchange may leave a partial frame unread
        let degraded = Capability {
            streaming: false,
            source: CapabilitySource::Unknown,
            needs_reconnect: true,
        };

        match tokio::time::timeout(self.query_timeout, connection.describe()).await {
            Ok(Ok(voices)) => {
                let capability = lookup(&voices, CapabilitySource::Query);
                registry.record_success(backend.role, Some(voices));
                capability
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    backend = %backend.address,
                    error = %e,
                    "Capability query failed, using sentence segmentation"
                );
                degraded
            }
            Err(_) => {
                tracing::warn!(
                    backend = %backend.address,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Capability query timed out, using sentence segmentation"
                );
                degraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_matching() {
        let mut overrides = HashMap::new();
        overrides.insert("Irina".to_string(), true);
        overrides.insert("amy:p226".to_string(), false);
        let probe = CapabilityProbe::new(overrides, Duration::from_secs(1));

        assert_eq!(probe.override_for("irina"), Some(true));
        assert_eq!(probe.override_for("IRINA:speaker"), Some(true));
        assert_eq!(probe.override_for("amy:p226"), Some(false));
        assert_eq!(probe.override_for("amy"), None);
    }
}
