//! Event types used by a TTS client
//!
//! Only the subset of the protocol the proxy speaks: capability discovery,
//! one-shot and streaming synthesis, audio and errors.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tts_proxy_core::{AudioFormat, VoiceCapabilities, VoiceCatalog, VoiceSelection};

use crate::{Event, TransportError};

pub const DESCRIBE: &str = "describe";
pub const INFO: &str = "info";
pub const SYNTHESIZE: &str = "synthesize";
pub const SYNTHESIZE_START: &str = "synthesize-start";
pub const SYNTHESIZE_CHUNK: &str = "synthesize-chunk";
pub const SYNTHESIZE_STOP: &str = "synthesize-stop";
pub const SYNTHESIZE_STOPPED: &str = "synthesize-stopped";
pub const AUDIO_START: &str = "audio-start";
pub const AUDIO_CHUNK: &str = "audio-chunk";
pub const AUDIO_STOP: &str = "audio-stop";
pub const ERROR: &str = "error";

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn voice_value(voice: &VoiceSelection) -> Value {
    match &voice.speaker {
        Some(speaker) => json!({ "name": voice.name, "speaker": speaker }),
        None => json!({ "name": voice.name }),
    }
}

pub fn describe() -> Event {
    Event::new(DESCRIBE)
}

/// One-shot synthesis of `text`
pub fn synthesize(text: &str, voice: &VoiceSelection) -> Event {
    Event::new(SYNTHESIZE).with_data(object(json!({
        "text": text,
        "voice": voice_value(voice),
    })))
}

pub fn synthesize_start(voice: &VoiceSelection) -> Event {
    Event::new(SYNTHESIZE_START).with_data(object(json!({ "voice": voice_value(voice) })))
}

pub fn synthesize_chunk(text: &str) -> Event {
    Event::new(SYNTHESIZE_CHUNK).with_data(object(json!({ "text": text })))
}

pub fn synthesize_stop() -> Event {
    Event::new(SYNTHESIZE_STOP)
}

/// `info` response to `describe`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub tts: Vec<TtsProgram>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsProgram {
    pub name: String,
    #[serde(default = "default_true")]
    pub installed: bool,
    #[serde(default)]
    pub supports_synthesize_streaming: bool,
    #[serde(default)]
    pub voices: Vec<TtsVoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsVoice {
    pub name: String,
    #[serde(default = "default_true")]
    pub installed: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub speakers: Option<Vec<TtsSpeaker>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsSpeaker {
    pub name: String,
}

fn default_true() -> bool {
    true
}

impl Info {
    pub fn from_event(event: &Event) -> Result<Self, TransportError> {
        if !event.is(INFO) {
            return Err(TransportError::Malformed(format!(
                "expected info, got {}",
                event.event_type
            )));
        }
        Ok(serde_json::from_value(Value::Object(event.data.clone()))?)
    }

    /// Installed voices keyed by name; streaming is a property of the program
    pub fn into_catalog(self) -> VoiceCatalog {
        self.tts
            .into_iter()
            .filter(|program| program.installed)
            .flat_map(|program| {
                let streaming = program.supports_synthesize_streaming;
                program
                    .voices
                    .into_iter()
                    .filter(|voice| voice.installed)
                    .map(move |voice| {
                        let caps = VoiceCapabilities {
                            streaming,
                            languages: voice.languages,
                            speakers: voice
                                .speakers
                                .unwrap_or_default()
                                .into_iter()
                                .map(|s| s.name)
                                .collect(),
                        };
                        (voice.name, caps)
                    })
            })
            .collect()
    }
}

/// Format fields carried by `audio-start` and `audio-chunk`
///
/// `None` when the event carries no format; out-of-range values are malformed.
pub fn audio_format(event: &Event) -> Result<Option<AudioFormat>, TransportError> {
    let field = |name: &str| event.data.get(name).and_then(Value::as_u64);
    let (Some(rate), Some(width), Some(channels)) =
        (field("rate"), field("width"), field("channels"))
    else {
        return Ok(None);
    };

    let out_of_range = |name: &str, value: u64| {
        TransportError::Malformed(format!(
            "{} {} out of range in {}",
            name, value, event.event_type
        ))
    };
    let format = AudioFormat::new(
        u32::try_from(rate).map_err(|_| out_of_range("rate", rate))?,
        u16::try_from(width).map_err(|_| out_of_range("width", width))?,
        u16::try_from(channels).map_err(|_| out_of_range("channels", channels))?,
    );
    format.validate().map_err(|reason| {
        TransportError::Malformed(format!("{} in {}", reason, event.event_type))
    })?;
    Ok(Some(format))
}

pub fn audio_payload(event: &Event) -> Bytes {
    event.payload.clone().unwrap_or_default()
}

/// Translate an `error` event
pub fn backend_error(event: &Event) -> TransportError {
    TransportError::Backend {
        code: event
            .data
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: event
            .data
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    }
}
