//! Synthesis metrics
//!
//! Recorded through the `metrics` facade; the server installs the
//! Prometheus recorder. Without a recorder these are no-ops.

use metrics::{counter, gauge, histogram};

pub fn record_session_started() {
    counter!("tts_proxy_sessions_total").increment(1);
    gauge!("tts_proxy_sessions_active").increment(1.0);
}

pub fn record_session_finished(outcome: &'static str) {
    gauge!("tts_proxy_sessions_active").decrement(1.0);
    counter!("tts_proxy_sessions_finished_total", "outcome" => outcome).increment(1);
}

pub fn record_path(path: &'static str) {
    counter!("tts_proxy_synthesis_path_total", "path" => path).increment(1);
}

pub fn record_backend_selected(role: &'static str) {
    counter!("tts_proxy_backend_selected_total", "role" => role).increment(1);
}

pub fn record_backend_unavailable(role: &'static str) {
    counter!("tts_proxy_backend_unavailable_total", "role" => role).increment(1);
}

pub fn record_failover() {
    counter!("tts_proxy_failovers_total").increment(1);
}

pub fn record_definitive_failure() {
    counter!("tts_proxy_definitive_failures_total").increment(1);
}

pub fn record_capability_source(source: &'static str) {
    counter!("tts_proxy_capability_lookups_total", "source" => source).increment(1);
}

pub fn record_first_chunk_latency(duration_secs: f64) {
    histogram!("tts_proxy_time_to_first_chunk_seconds").record(duration_secs);
}

pub fn record_chunk(bytes: usize) {
    counter!("tts_proxy_audio_chunks_total").increment(1);
    counter!("tts_proxy_audio_bytes_total").increment(bytes as u64);
}
