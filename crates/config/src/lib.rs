//! Configuration for the streaming TTS proxy
//!
//! Settings are layered with the `config` crate:
//! 1. `config/default.yaml`
//! 2. `config/{env}.yaml`
//! 3. `TTS_PROXY__*` environment variables

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, BackendConfig, BackendsConfig, ObservabilityConfig, ServerConfig, Settings,
    SynthesisConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("No TTS backend configured")]
    NoBackend,
}

impl From<ConfigError> for tts_proxy_core::Error {
    fn from(err: ConfigError) -> Self {
        tts_proxy_core::Error::Config(err.to_string())
    }
}
