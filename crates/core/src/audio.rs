//! Audio chunk and format types
//!
//! Payloads are opaque bytes; the proxy never decodes or resamples them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// PCM layout announced by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub rate: u32,
    /// Bytes per sample
    pub width: u16,
    /// Channel count
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(rate: u32, width: u16, channels: u16) -> Self {
        Self {
            rate,
            width,
            channels,
        }
    }

    /// Check the layout is one a WAV container can describe
    ///
    /// Widths are 1 to 4 bytes; byte rate and block size must fit their
    /// header fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.rate == 0 {
            return Err("sample rate must be positive".to_string());
        }
        if !(1..=MAX_SAMPLE_WIDTH).contains(&self.width) {
            return Err(format!(
                "sample width must be 1 to {} bytes, got {}",
                MAX_SAMPLE_WIDTH, self.width
            ));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(format!(
                "channel count must be 1 to {}, got {}",
                MAX_CHANNELS, self.channels
            ));
        }
        if u32::try_from(self.wide_byte_rate()).is_err() {
            return Err(format!("byte rate of {} Hz does not fit a WAV header", self.rate));
        }
        Ok(())
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.width.saturating_mul(8)
    }

    /// Saturates for layouts that fail `validate`
    pub fn byte_rate(&self) -> u32 {
        u32::try_from(self.wide_byte_rate()).unwrap_or(u32::MAX)
    }

    pub fn block_align(&self) -> u16 {
        self.width.saturating_mul(self.channels)
    }

    fn wide_byte_rate(&self) -> u64 {
        u64::from(self.rate) * u64::from(self.width) * u64::from(self.channels)
    }
}

/// Widest sample the proxy frames, in bytes
pub const MAX_SAMPLE_WIDTH: u16 = 4;

/// Most channels accepted in a format
pub const MAX_CHANNELS: u16 = 32;

impl Default for AudioFormat {
    /// 22.05kHz 16-bit mono, what Piper-class voices produce
    fn default() -> Self {
        Self::new(22050, 2, 1)
    }
}

/// One unit of audio delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Strictly increasing within a session, starting at 0
    pub sequence: u64,
    /// Raw audio bytes, forwarded unmodified
    pub payload: Bytes,
    /// Format announced by the backend for this payload
    pub format: Option<AudioFormat>,
    /// Set on exactly one chunk: the terminal, empty one
    pub is_final: bool,
}

impl AudioChunk {
    pub fn data(sequence: u64, payload: Bytes, format: Option<AudioFormat>) -> Self {
        Self {
            sequence,
            payload,
            format,
            is_final: false,
        }
    }

    pub fn terminal(sequence: u64) -> Self {
        Self {
            sequence,
            payload: Bytes::new(),
            format: None,
            is_final: true,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
