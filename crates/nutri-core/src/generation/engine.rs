//! The greedy decode loop.
//!
//! Every step re-encodes the whole growing sequence; there is no key/value
//! cache. That keeps the loop trivially correct against any runtime that
//! can score a full sequence, at the cost of quadratic work in the output
//! length. An incremental runtime can be swapped in behind
//! [`LanguageModel`] as long as it returns the same logits.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GenerationSettings;

use super::GenerationFault;
use super::cleanup::clean_completion;

// ---------------------------------------------------------------------------
// Runtime seams
// ---------------------------------------------------------------------------

/// Text <-> token id conversion for a specific model vocabulary.
pub trait Tokenizer: Send + Sync {
    /// Encode `text` into token ids (no padding, no truncation).
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationFault>;

    /// Decode `ids` back into text, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String, GenerationFault>;

    /// The end-of-sequence id, if the vocabulary has one.
    fn eos_token_id(&self) -> Option<u32>;
}

/// A causal language model that scores the next token.
pub trait LanguageModel: Send + Sync {
    /// Run one forward pass over the full sequence and return the logits for
    /// the position after the last token (one value per vocabulary entry).
    ///
    /// `input_ids` and `attention_mask` always have equal length.
    fn next_token_logits(
        &self,
        input_ids: &[u32],
        attention_mask: &[u32],
    ) -> Result<Vec<f32>, GenerationFault>;
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The token sequence and attention mask of one in-flight decode.
///
/// Owned exclusively by the decode loop and dropped when it ends. Both
/// vectors always have the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationState {
    token_ids: Vec<u32>,
    attention_mask: Vec<u32>,
    prompt_len: usize,
}

impl GenerationState {
    /// Start from an encoded prompt; every prompt position is attended.
    pub fn new(prompt_ids: Vec<u32>) -> Self {
        let prompt_len = prompt_ids.len();
        Self {
            attention_mask: vec![1; prompt_len],
            token_ids: prompt_ids,
            prompt_len,
        }
    }

    /// Append a generated token with mask value 1.
    pub fn push(&mut self, token_id: u32) {
        self.token_ids.push(token_id);
        self.attention_mask.push(1);
    }

    pub fn token_ids(&self) -> &[u32] {
        &self.token_ids
    }

    pub fn attention_mask(&self) -> &[u32] {
        &self.attention_mask
    }

    /// Tokens appended after the prompt.
    pub fn generated(&self) -> &[u32] {
        &self.token_ids[self.prompt_len..]
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Why the decode loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced the end-of-sequence token.
    EndOfSequence,
    /// `max_new_tokens` tokens were generated.
    TokenCap,
}

/// Cleaned output of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Tokens appended to the prompt, including a final end-of-sequence.
    pub generated_tokens: usize,
    pub stop_reason: StopReason,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Greedy, deterministic, bounded text generation.
///
/// Cheap to clone; holds no per-call state, so one engine can serve many
/// concurrent calls.
#[derive(Clone)]
pub struct GenerationEngine {
    tokenizer: Arc<dyn Tokenizer>,
    model: Arc<dyn LanguageModel>,
    settings: GenerationSettings,
}

impl GenerationEngine {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        model: Arc<dyn LanguageModel>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            tokenizer,
            model,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.tokenizer.eos_token_id()
    }

    /// Generate at most `max_new_tokens` tokens after `prompt`.
    pub fn generate(&self, prompt: &str, max_new_tokens: u32) -> Result<Completion, GenerationFault> {
        self.generate_cancellable(prompt, max_new_tokens, &CancellationToken::new())
    }

    /// Like [`Self::generate`], checking `cancel` before every forward pass.
    pub fn generate_cancellable(
        &self,
        prompt: &str,
        max_new_tokens: u32,
        cancel: &CancellationToken,
    ) -> Result<Completion, GenerationFault> {
        if prompt.trim().is_empty() {
            return Err(GenerationFault::InvalidRequest("prompt is empty".to_owned()));
        }
        if max_new_tokens == 0 {
            return Err(GenerationFault::InvalidRequest(
                "max_new_tokens must be positive".to_owned(),
            ));
        }

        let full_prompt = match &self.settings.answer_suffix {
            Some(suffix) => format!("{prompt}{suffix}"),
            None => prompt.to_owned(),
        };

        let prompt_ids = self.tokenizer.encode(&full_prompt)?;
        if prompt_ids.is_empty() {
            return Err(GenerationFault::InvalidRequest(
                "prompt encoded to zero tokens".to_owned(),
            ));
        }

        let eos = self.eos_token_id();
        let mut state = GenerationState::new(prompt_ids);
        let mut stop_reason = StopReason::TokenCap;

        for _ in 0..max_new_tokens {
            if cancel.is_cancelled() {
                return Err(GenerationFault::Cancelled);
            }

            let logits = self
                .model
                .next_token_logits(state.token_ids(), state.attention_mask())?;
            let next = argmax(&logits).ok_or_else(|| {
                GenerationFault::Inference("model returned no usable logits".to_owned())
            })?;

            state.push(next);

            if eos == Some(next) {
                stop_reason = StopReason::EndOfSequence;
                break;
            }
        }

        let generated_tokens = state.generated().len();
        let full_text = self.tokenizer.decode(state.token_ids())?;
        let raw = match full_text.strip_prefix(full_prompt.as_str()) {
            Some(rest) => rest.to_owned(),
            // Decoding is not always a perfect inverse of encoding (normalizers,
            // byte fallback). Decode the continuation on its own instead.
            None => self.tokenizer.decode(state.generated())?,
        };

        tracing::debug!(
            generated_tokens,
            stop_reason = ?stop_reason,
            "generation finished"
        );

        Ok(Completion {
            text: clean_completion(&raw, self.settings.max_sentences),
            generated_tokens,
            stop_reason,
        })
    }
}

impl std::fmt::Debug for GenerationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationEngine")
            .field("settings", &self.settings)
            .field("eos", &self.eos_token_id())
            .finish()
    }
}

/// Index of the highest logit. Ties go to the lowest index; NaN is never
/// selected. Returns `None` when no logit is comparable.
fn argmax(logits: &[f32]) -> Option<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in logits.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    best.and_then(|(idx, _)| u32::try_from(idx).ok())
}
