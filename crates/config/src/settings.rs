//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use tts_proxy_core::AudioFormat;

use crate::constants;
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Primary/fallback backend pair
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Synthesis behaviour
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Logging, tracing and metrics
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single file (format from its extension), without env overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.primary.is_none() && self.backends.fallback.is_none() {
            return Err(ConfigError::NoBackend);
        }

        if let Some(primary) = &self.backends.primary {
            primary.validate("backends.primary")?;
        }
        if let Some(fallback) = &self.backends.fallback {
            fallback.validate("backends.fallback")?;
        }

        if self.synthesis.liveness_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.liveness_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.synthesis.chunk_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.chunk_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.synthesis.liveness_timeout_ms >= self.synthesis.chunk_timeout_ms {
            tracing::warn!(
                liveness_ms = self.synthesis.liveness_timeout_ms,
                chunk_ms = self.synthesis.chunk_timeout_ms,
                "Liveness timeout is not shorter than the chunk timeout; failover will be slow"
            );
        }

        if self.synthesis.default_voice.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.default_voice".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        self.synthesis
            .default_format
            .validate()
            .map_err(|message| ConfigError::InvalidValue {
                field: "synthesis.default_format".to_string(),
                message,
            })?;

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    constants::server::HOST.to_string()
}

fn default_port() -> u16 {
    constants::server::PORT
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
        }
    }
}

/// Primary and fallback backends; either may be absent, not both
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub primary: Option<BackendConfig>,

    #[serde(default)]
    pub fallback: Option<BackendConfig>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: Some(BackendConfig::new("127.0.0.1", constants::backend::DEFAULT_PORT)),
            fallback: None,
        }
    }
}

/// One wire-protocol TTS server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub host: String,

    #[serde(default = "default_backend_port")]
    pub port: u16,

    /// Voice to request from this backend instead of the caller's
    #[serde(default)]
    pub voice: Option<String>,
}

fn default_backend_port() -> u16 {
    constants::backend::DEFAULT_PORT
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.host", field),
                message: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.port", field),
                message: "must not be 0".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Voice used when the request names none
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Connect + capability query budget per backend
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_ms: u64,

    /// Max gap between backend events during synthesis
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_ms: u64,

    /// Split run-on sentences longer than this many characters
    #[serde(default)]
    pub max_sentence_chars: Option<usize>,

    /// Per-voice streaming capability, overriding what backends advertise.
    /// Keys match voice ids case-insensitively.
    #[serde(default)]
    pub streaming_overrides: HashMap<String, bool>,

    /// Format assumed for WAV framing when a request does not name one
    #[serde(default)]
    pub default_format: AudioFormat,
}

fn default_voice() -> String {
    constants::backend::DEFAULT_VOICE.to_string()
}

fn default_liveness_timeout() -> u64 {
    constants::timeouts::LIVENESS_MS
}

fn default_chunk_timeout() -> u64 {
    constants::timeouts::CHUNK_INACTIVITY_MS
}

impl SynthesisConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            default_voice: default_voice(),
            liveness_timeout_ms: default_liveness_timeout(),
            chunk_timeout_ms: default_chunk_timeout(),
            max_sentence_chars: None,
            streaming_overrides: HashMap::new(),
            default_format: AudioFormat::new(
                constants::audio::SAMPLE_RATE,
                constants::audio::SAMPLE_WIDTH,
                constants::audio::CHANNELS,
            ),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log output
    #[serde(default)]
    pub log_json: bool,

    /// Export spans to an OTLP collector
    #[serde(default)]
    pub tracing_enabled: bool,

    /// OTLP endpoint, e.g. http://localhost:4317
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            tracing_enabled: false,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (TTS_PROXY__ prefix, `__` between levels)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("TTS_PROXY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
