//! Voice catalogs advertised by backends

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability flags for one voice on one backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCapabilities {
    /// Backend accepts text incrementally and emits audio as it goes
    pub streaming: bool,
    /// Language codes the voice speaks
    #[serde(default)]
    pub languages: Vec<String>,
    /// Named speakers for multi-speaker models
    #[serde(default)]
    pub speakers: Vec<String>,
}

/// Voice id → capabilities, as last reported by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, VoiceCapabilities>,
}

impl VoiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, caps: VoiceCapabilities) {
        self.voices.insert(name.into(), caps);
    }

    pub fn with_voice(mut self, name: impl Into<String>, caps: VoiceCapabilities) -> Self {
        self.insert(name, caps);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VoiceCapabilities> {
        self.voices.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.voices.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VoiceCapabilities)> {
        self.voices.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

impl FromIterator<(String, VoiceCapabilities)> for VoiceCatalog {
    fn from_iter<T: IntoIterator<Item = (String, VoiceCapabilities)>>(iter: T) -> Self {
        Self {
            voices: iter.into_iter().collect(),
        }
    }
}
