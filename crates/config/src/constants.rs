//! Centralized constants for the TTS proxy
//!
//! Defaults used by the settings structs and by tests. Override through
//! configuration rather than editing these.

/// Backend defaults
pub mod backend {
    /// Port the wire-protocol TTS servers listen on by default
    pub const DEFAULT_PORT: u16 = 10200;

    /// Voice used when the caller does not name one
    pub const DEFAULT_VOICE: &str = "male_01";
}

/// Timeouts (in milliseconds)
pub mod timeouts {
    /// Liveness check: connect plus capability query.
    /// Short, because its job is fast failover, not waiting out a slow backend.
    pub const LIVENESS_MS: u64 = 2_000;

    /// Maximum silence between two backend events once synthesis has started
    pub const CHUNK_INACTIVITY_MS: u64 = 10_000;
}

/// Audio defaults for WAV framing on the HTTP surface
pub mod audio {
    pub const SAMPLE_RATE: u32 = 22050;

    /// Bytes per sample
    pub const SAMPLE_WIDTH: u16 = 2;

    pub const CHANNELS: u16 = 1;
}

/// Server defaults
pub mod server {
    pub const HOST: &str = "0.0.0.0";

    pub const PORT: u16 = 8080;
}
