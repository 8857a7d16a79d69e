//! Bounded greedy text generation.
//!
//! The [`GenerationEngine`] turns a prompt into a [`Completion`] by repeated
//! full-sequence forward passes through a [`LanguageModel`], then cleans the
//! continuation with [`clean_completion`]. Faults are returned as
//! [`GenerationFault`] values; turning them into user-facing text is the
//! caller's job (see [`crate::specialist`]).

pub mod cleanup;
pub mod engine;

pub use cleanup::{clean_completion, split_sentences};
pub use engine::{
    Completion, GenerationEngine, GenerationState, LanguageModel, StopReason, Tokenizer,
};

/// Everything that can go wrong between a prompt and its completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationFault {
    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("provider timed out")]
    Timeout,

    #[error("provider returned no content")]
    NoContent,

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("generation cancelled")]
    Cancelled,
}
