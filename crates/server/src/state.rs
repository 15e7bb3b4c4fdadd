//! Application State

use std::sync::Arc;

use tts_proxy_config::Settings;
use tts_proxy_pipeline::SynthesisEngine;

/// Shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub engine: Arc<SynthesisEngine>,
}

impl AppState {
    pub fn new(config: Settings, engine: SynthesisEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}
