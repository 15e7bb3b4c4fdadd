//! Backend registry
//!
//! Holds one descriptor per configured slot. Descriptors are never mutated:
//! every update builds a new one and swaps the `Arc`, so sessions keep a
//! consistent snapshot for their whole lifetime.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use tts_proxy_config::{BackendConfig, BackendsConfig};
use tts_proxy_core::{BackendRole, Error, Result, VoiceCatalog, VoiceSelection};
use tts_proxy_transport::BackendAddress;

/// Configuration plus last known state of one backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    pub address: BackendAddress,
    pub role: BackendRole,
    /// Voice requested from this backend instead of the caller's
    pub voice_override: Option<String>,
    /// Voices from the last successful capability query; `None` until one
    /// succeeds or after the backend fails
    pub voices: Option<Arc<VoiceCatalog>>,
    pub last_reachable: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl BackendDescriptor {
    pub fn new(address: BackendAddress, role: BackendRole) -> Self {
        Self {
            address,
            role,
            voice_override: None,
            voices: None,
            last_reachable: None,
            last_failure: None,
        }
    }

    pub fn from_config(config: &BackendConfig, role: BackendRole) -> Self {
        let mut descriptor = Self::new(BackendAddress::new(&config.host, config.port), role);
        descriptor.voice_override = config.voice.clone();
        descriptor
    }

    pub fn with_voice_override(mut self, voice: impl Into<String>) -> Self {
        self.voice_override = Some(voice.into());
        self
    }

    pub fn with_voices(mut self, voices: VoiceCatalog) -> Self {
        self.voices = Some(Arc::new(voices));
        self
    }

    /// Voice id to send to this backend for a requested voice id
    pub fn voice_for<'a>(&'a self, requested: &'a str) -> &'a str {
        self.voice_override.as_deref().unwrap_or(requested)
    }

    /// Reachable at the last contact
    pub fn is_reachable(&self) -> bool {
        match (self.last_reachable, self.last_failure) {
            (Some(ok), Some(failed)) => ok > failed,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// `Some(true/false)` when the catalog is known, `None` otherwise
    pub fn has_voice(&self, voice_id: &str) -> Option<bool> {
        let name = VoiceSelection::parse(self.voice_for(voice_id)).name;
        self.voices.as_ref().map(|voices| voices.contains(&name))
    }
}

/// Process-wide backend state shared by all sessions
#[derive(Debug)]
pub struct BackendRegistry {
    primary: Option<RwLock<Arc<BackendDescriptor>>>,
    fallback: Option<RwLock<Arc<BackendDescriptor>>>,
}

impl BackendRegistry {
    pub fn new(
        primary: Option<BackendDescriptor>,
        fallback: Option<BackendDescriptor>,
    ) -> Result<Self> {
        if primary.is_none() && fallback.is_none() {
            return Err(Error::Config("no TTS backend configured".to_string()));
        }
        Ok(Self {
            primary: primary.map(|d| RwLock::new(Arc::new(d))),
            fallback: fallback.map(|d| RwLock::new(Arc::new(d))),
        })
    }

    pub fn from_config(config: &BackendsConfig) -> Result<Self> {
        Self::new(
            config
                .primary
                .as_ref()
                .map(|c| BackendDescriptor::from_config(c, BackendRole::Primary)),
            config
                .fallback
                .as_ref()
                .map(|c| BackendDescriptor::from_config(c, BackendRole::Fallback)),
        )
    }

    fn slot(&self, role: BackendRole) -> Option<&RwLock<Arc<BackendDescriptor>>> {
        match role {
            BackendRole::Primary => self.primary.as_ref(),
            BackendRole::Fallback => self.fallback.as_ref(),
        }
    }

    pub fn get(&self, role: BackendRole) -> Option<Arc<BackendDescriptor>> {
        self.slot(role).map(|slot| slot.read().clone())
    }

    /// Configured backends in failover order
    pub fn snapshot(&self) -> Vec<Arc<BackendDescriptor>> {
        [BackendRole::Primary, BackendRole::Fallback]
            .into_iter()
            .filter_map(|role| self.get(role))
            .collect()
    }

    fn replace<F>(&self, role: BackendRole, update: F)
    where
        F: FnOnce(&BackendDescriptor) -> BackendDescriptor,
    {
        if let Some(slot) = self.slot(role) {
            let mut guard = slot.write();
            let next = update(&guard);
            *guard = Arc::new(next);
        }
    }

    /// Successful contact; `voices` replaces the cached catalog when given
    pub fn record_success(&self, role: BackendRole, voices: Option<VoiceCatalog>) {
        self.replace(role, |current| {
            let mut next = current.clone();
            next.last_reachable = Some(Utc::now());
            if let Some(voices) = voices {
                next.voices = Some(Arc::new(voices));
            }
            next
        });
    }

    /// Failed contact; drops the cached catalog so it is fetched again once
    /// the backend recovers
    pub fn record_failure(&self, role: BackendRole) {
        self.replace(role, |current| {
            let mut next = current.clone();
            next.last_failure = Some(Utc::now());
            next.voices = None;
            next
        });
    }

    pub fn any_reachable(&self) -> bool {
        self.snapshot().iter().any(|d| d.is_reachable())
    }

    /// Reject a voice that no backend can serve
    ///
    /// Only decided when every backend's catalog is known; otherwise the
    /// voice is let through and the backend decides.
    pub fn validate_voice(&self, voice_id: &str) -> Result<()> {
        let mut known = Vec::new();
        for descriptor in self.snapshot() {
            match descriptor.has_voice(voice_id) {
                Some(true) | None => return Ok(()),
                Some(false) => known.push(descriptor.address.to_string()),
            }
        }
        Err(Error::InvalidRequest(format!(
            "voice '{}' is not available on {}",
            voice_id,
            known.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tts_proxy_core::VoiceCapabilities;

    fn catalog(names: &[&str]) -> VoiceCatalog {
        names
            .iter()
            .map(|n| (n.to_string(), VoiceCapabilities::default()))
            .collect()
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::new(
            Some(BackendDescriptor::new(
                BackendAddress::new("tts-a", 10200),
                BackendRole::Primary,
            )),
            Some(BackendDescriptor::new(
                BackendAddress::new("tts-b", 10200),
                BackendRole::Fallback,
            )),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_a_backend() {
        assert!(BackendRegistry::new(None, None).is_err());
    }

    #[test]
    fn test_snapshot_is_unchanged_by_replacement() {
        let registry = registry();
        let before = registry.get(BackendRole::Primary).unwrap();

        registry.record_success(BackendRole::Primary, Some(catalog(&["amy"])));

        assert!(before.voices.is_none());
        assert!(before.last_reachable.is_none());
        let after = registry.get(BackendRole::Primary).unwrap();
        assert!(after.voices.as_ref().unwrap().contains("amy"));
        assert!(after.is_reachable());
    }

    #[test]
    fn test_failure_drops_voices() {
        let registry = registry();
        registry.record_success(BackendRole::Fallback, Some(catalog(&["amy"])));
        registry.record_failure(BackendRole::Fallback);

        let fallback = registry.get(BackendRole::Fallback).unwrap();
        assert!(fallback.voices.is_none());
        assert!(!fallback.is_reachable());
        assert!(!registry.any_reachable());
    }

    #[test]
    fn test_validate_voice_needs_every_catalog() {
        let registry = registry();
        registry.record_success(BackendRole::Primary, Some(catalog(&["amy"])));

        // fallback catalog unknown
        assert!(registry.validate_voice("nobody").is_ok());

        registry.record_success(BackendRole::Fallback, Some(catalog(&["irina"])));
        assert!(registry.validate_voice("irina:speaker1").is_ok());
        assert!(matches!(
            registry.validate_voice("nobody"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_voice_override() {
        let descriptor = BackendDescriptor::new(BackendAddress::new("b", 1), BackendRole::Fallback)
            .with_voice_override("amy")
            .with_voices(catalog(&["amy"]));
        assert_eq!(descriptor.voice_for("irina"), "amy");
        assert_eq!(descriptor.has_voice("irina"), Some(true));
    }
}
