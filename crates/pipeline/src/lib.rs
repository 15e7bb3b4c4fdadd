//! Synthesis orchestration
//!
//! A request flows through:
//! 1. `BackendSelector`: primary first, fallback on liveness failure
//! 2. `CapabilityProbe`: does the chosen backend stream this voice natively?
//! 3. `SynthesisSession`: native streaming or per-sentence synthesis, both
//!    delivered as one ordered chunk stream
//!
//! `SynthesisEngine` ties these together behind a single `synthesize` call.

pub mod engine;
pub mod metrics;
pub mod probe;
pub mod registry;
pub mod selector;
pub mod session;

pub use engine::SynthesisEngine;
pub use probe::{Capability, CapabilityProbe, CapabilitySource};
pub use registry::{BackendDescriptor, BackendRegistry};
pub use selector::{BackendSelector, Reachable};
pub use session::{AudioStream, SessionState, SynthesisPath, SynthesisSession};
