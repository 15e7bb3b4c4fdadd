//! Synthesis requests and voice selection

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AudioFormat, Error, Result};

/// Which configured slot a backend occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRole {
    Primary,
    Fallback,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendRole::Primary => "primary",
            BackendRole::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice as sent on the wire: model name plus optional speaker
///
/// Parsed from ids of the form `name` or `name:speaker`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceSelection {
    pub name: String,
    pub speaker: Option<String>,
}

impl VoiceSelection {
    pub fn parse(voice_id: &str) -> Self {
        match voice_id.split_once(':') {
            Some((name, speaker)) if !speaker.is_empty() => Self {
                name: name.to_string(),
                speaker: Some(speaker.to_string()),
            },
            Some((name, _)) => Self {
                name: name.to_string(),
                speaker: None,
            },
            None => Self {
                name: voice_id.to_string(),
                speaker: None,
            },
        }
    }
}

impl fmt::Display for VoiceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.speaker {
            Some(speaker) => write!(f, "{}:{}", self.name, speaker),
            None => f.write_str(&self.name),
        }
    }
}

/// An immutable synthesis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    text: String,
    voice_id: String,
    format: Option<AudioFormat>,
}

impl SynthesisRequest {
    /// Build a request, rejecting blank text or voice
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let voice_id = voice_id.into();

        if text.trim().is_empty() {
            return Err(Error::InvalidRequest("text is empty".to_string()));
        }
        if voice_id.trim().is_empty() {
            return Err(Error::InvalidRequest("voice id is empty".to_string()));
        }

        Ok(Self {
            text,
            voice_id: voice_id.trim().to_string(),
            format: None,
        })
    }

    /// Attach the format the caller expects; advisory only, never resampled
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn voice(&self) -> VoiceSelection {
        VoiceSelection::parse(&self.voice_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_text() {
        let err = SynthesisRequest::new("   \n", "amy").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_rejects_blank_voice() {
        assert!(SynthesisRequest::new("Hello.", " ").is_err());
    }

    #[test]
    fn test_voice_with_speaker() {
        let voice = VoiceSelection::parse("en_US-libritts-high:p226");
        assert_eq!(voice.name, "en_US-libritts-high");
        assert_eq!(voice.speaker.as_deref(), Some("p226"));
        assert_eq!(voice.to_string(), "en_US-libritts-high:p226");
    }

    #[test]
    fn test_voice_trailing_colon() {
        let voice = VoiceSelection::parse("amy:");
        assert_eq!(voice.name, "amy");
        assert!(voice.speaker.is_none());
    }
}
