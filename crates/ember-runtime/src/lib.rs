//! Embeddable runtime for compiled Ember scenarios.
//!
//! Wraps one VM and one compiled program behind two public entries,
//! `run_init(seed)` and `tick(frame, dt)`, with capability-gated natives,
//! deterministic injected randomness, and structured status tracking.
//! Neither entry ever panics; every failure becomes data.

pub mod asset;
pub mod error;
pub mod events;
pub mod natives;
pub mod rng;
mod runtime;

pub use asset::{AssetError, ScenarioAsset};
pub use error::RuntimeError;
pub use events::{DiagnosticEvent, EventKind, LogSink};
pub use natives::{
    baseline_grants, builtin_capability, capability, Host, NativeBinding, NativeCall, NativeFn,
    NullHost, Outcome,
};
pub use rng::{RngProvider, SplitMix64};
pub use runtime::{Runtime, RuntimeConfig, RuntimeStatus, ScheduledTask};
