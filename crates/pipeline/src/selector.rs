//! Primary/fallback backend selection

use std::sync::Arc;
use std::time::Duration;

use tts_proxy_core::{BackendRole, Error, Result, VoiceCatalog};
use tts_proxy_transport::{TransportError, TtsConnection, TtsTransport};

use crate::metrics;
use crate::registry::{BackendDescriptor, BackendRegistry};

/// A backend that passed the liveness check, with its open connection
pub struct Reachable {
    /// Descriptor as it was before this contact was recorded
    pub descriptor: Arc<BackendDescriptor>,
    /// Catalog the liveness check fetched, if it returned one
    pub voices: Option<VoiceCatalog>,
    pub connection: Box<dyn TtsConnection>,
}

impl std::fmt::Debug for Reachable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reachable")
            .field("descriptor", &self.descriptor)
            .field("voices", &self.voices.as_ref().map(VoiceCatalog::len))
            .finish_non_exhaustive()
    }
}

/// Picks the backend for one request
///
/// The primary is checked first; the fallback only when the primary fails.
/// Each backend is checked at most once per call.
pub struct BackendSelector {
    transport: Arc<dyn TtsTransport>,
    registry: Arc<BackendRegistry>,
    liveness_timeout: Duration,
}

impl BackendSelector {
    pub fn new(
        transport: Arc<dyn TtsTransport>,
        registry: Arc<BackendRegistry>,
        liveness_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            liveness_timeout,
        }
    }

    pub async fn select(&self) -> Result<Reachable> {
        let mut attempts = Vec::new();

        for role in [BackendRole::Primary, BackendRole::Fallback] {
            let Some(descriptor) = self.registry.get(role) else {
                continue;
            };

            if !attempts.is_empty() {
                metrics::record_failover();
                tracing::warn!(
                    backend = %descriptor.address,
                    "Primary TTS backend unavailable, trying fallback"
                );
            }

            match self.check(&descriptor).await {
                Ok((connection, voices)) => {
                    self.refresh(role, voices.clone());
                    metrics::record_backend_selected(role.as_str());
                    tracing::debug!(
                        backend = %descriptor.address,
                        role = %role,
                        "Selected TTS backend"
                    );
                    return Ok(Reachable {
                        descriptor,
                        voices: Some(voices),
                        connection,
                    });
                }
                Err(e) => {
                    self.registry.record_failure(role);
                    metrics::record_backend_unavailable(role.as_str());
                    tracing::warn!(error = %e, "TTS backend failed liveness check");
                    attempts.push(e.to_string());
                }
            }
        }

        metrics::record_definitive_failure();
        tracing::error!(attempts = ?attempts, "No TTS backend available");
        Err(Error::DefinitiveFailure { attempts })
    }

    /// Check every configured backend and record the outcome
    ///
    /// Used at startup so the first request finds warm catalogs; does not
    /// fail over and keeps no connection open.
    pub async fn refresh_all(&self) {
        for descriptor in self.registry.snapshot() {
            match self.check(&descriptor).await {
                Ok((mut connection, voices)) => {
                    connection.close().await;
                    tracing::info!(
                        backend = %descriptor.address,
                        role = %descriptor.role,
                        voices = voices.len(),
                        "TTS backend reachable"
                    );
                    self.registry.record_success(descriptor.role, Some(voices));
                }
                Err(e) => {
                    self.registry.record_failure(descriptor.role);
                    tracing::warn!(error = %e, "TTS backend unreachable");
                }
            }
        }
    }

    /// Fresh connection to a backend already chosen for a session
    ///
    /// Used when the selected connection can no longer be trusted before any
    /// audio was requested on it. No failover: the backend is committed.
    pub async fn reconnect(&self, descriptor: &BackendDescriptor) -> Result<Box<dyn TtsConnection>> {
        let connect = self.transport.connect(&descriptor.address);
        match tokio::time::timeout(self.liveness_timeout, connect).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(e)) => {
                self.registry.record_failure(descriptor.role);
                Err(unavailable(descriptor, e.to_string()))
            }
            Err(_) => {
                self.registry.record_failure(descriptor.role);
                Err(unavailable(
                    descriptor,
                    format!("no connection within {}ms", self.liveness_timeout.as_millis()),
                ))
            }
        }
    }

    /// Connect and query capabilities under the liveness timeout
    async fn check(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<(Box<dyn TtsConnection>, VoiceCatalog)> {
        let handshake = async {
            let mut connection = self.transport.connect(&descriptor.address).await?;
            match connection.describe().await {
                Ok(voices) => Ok::<_, TransportError>((connection, voices)),
                Err(e) => {
                    connection.close().await;
                    Err(e)
                }
            }
        };

        match tokio::time::timeout(self.liveness_timeout, handshake).await {
            Ok(Ok(reachable)) => Ok(reachable),
            Ok(Err(e)) => Err(unavailable(descriptor, e.to_string())),
            Err(_) => Err(unavailable(
                descriptor,
                format!("no response within {}ms", self.liveness_timeout.as_millis()),
            )),
        }
    }

    /// Store the fetched catalog without holding up the caller
    fn refresh(&self, role: BackendRole, voices: VoiceCatalog) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            registry.record_success(role, Some(voices));
        });
    }
}

fn unavailable(descriptor: &BackendDescriptor, reason: String) -> Error {
    Error::BackendUnavailable {
        role: descriptor.role,
        address: descriptor.address.to_string(),
        reason,
    }
}
