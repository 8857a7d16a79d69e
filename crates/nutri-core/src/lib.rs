//! Core of the nutri service: intent routing, condition specialists, the
//! greedy generation engine, and the plan-assembly pipeline.
//!
//! # Architecture
//!
//! ```text
//! free text ──> router::classify ──> SpecialistRegistry ──> SpecialistBackend
//!                                                               │
//!                                               GenerationProvider (http | local)
//!                                                               │
//!                                                       GenerationEngine
//!
//! Profile ──> PlanPipeline ──> diet-rules → gaps → targets → conflicts → plan
//! ```
//!
//! Every component receives its configuration at construction time; nothing
//! in this crate reads the process environment.

pub mod condition;
pub mod config;
pub mod generation;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod specialist;

pub use condition::Condition;
pub use config::{
    ConfigError, GenerationSettings, NutriSettings, PipelineMode, SpecialistSettings,
    StageEndpoints, StageTimeouts,
};
pub use generation::{Completion, GenerationEngine, GenerationFault, StopReason};
pub use pipeline::{PipelineFailure, PlanPipeline};
pub use provider::RequestFormat;
pub use router::{IntentRouter, classify};
pub use specialist::{ChatReply, SpecialistBackend, SpecialistRegistry};
