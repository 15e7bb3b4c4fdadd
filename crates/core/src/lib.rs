//! Core types for the streaming TTS proxy
//!
//! Everything here is transport-agnostic:
//! - Requests, audio chunks and audio formats
//! - Voice catalogs advertised by backends
//! - The error taxonomy shared by every crate
//! - Sentence segmentation for backends without native streaming

pub mod audio;
pub mod error;
pub mod request;
pub mod segmenter;
pub mod voices;

pub use audio::{AudioChunk, AudioFormat};
pub use error::{Error, FailureSignal, Result};
pub use request::{BackendRole, SynthesisRequest, VoiceSelection};
pub use segmenter::{Sentence, SentenceSegmenter, Sentences};
pub use voices::{VoiceCapabilities, VoiceCatalog};
