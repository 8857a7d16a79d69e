//! Integration tests for the greedy generation engine and the local provider.

use std::sync::{Arc, Mutex};

use nutri_core::generation::{LanguageModel, Tokenizer};
use nutri_core::provider::{GenerationProvider, GenerationRequest, LocalProvider};
use nutri_core::{GenerationEngine, GenerationFault, GenerationSettings, StopReason};
use tokio_util::sync::CancellationToken;

const EOS: u32 = 256;
const VOCAB: usize = 257;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// One token per byte, plus an end-of-sequence id that decodes to nothing.
struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationFault> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, GenerationFault> {
        let bytes: Vec<u8> = ids
            .iter()
            .filter_map(|&id| u8::try_from(id).ok())
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }
}

/// Emits `script` byte by byte after a prompt of known length, then either
/// EOS or the script again from the start.
struct ScriptedModel {
    script: Vec<u32>,
    prompt_len: usize,
    loop_forever: bool,
    calls: Mutex<Vec<(Vec<u32>, Vec<u32>)>>,
}

impl ScriptedModel {
    fn new(prompt: &str, script: &str, loop_forever: bool) -> Arc<Self> {
        Arc::new(Self {
            script: script.bytes().map(u32::from).collect(),
            prompt_len: prompt.len(),
            loop_forever,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(Vec<u32>, Vec<u32>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn next_token_logits(
        &self,
        input_ids: &[u32],
        attention_mask: &[u32],
    ) -> Result<Vec<f32>, GenerationFault> {
        self.calls
            .lock()
            .unwrap()
            .push((input_ids.to_vec(), attention_mask.to_vec()));

        let pos = input_ids.len() - self.prompt_len;
        let next = if self.loop_forever {
            self.script[pos % self.script.len()]
        } else {
            self.script.get(pos).copied().unwrap_or(EOS)
        };

        let mut logits = vec![0.0; VOCAB];
        logits[next as usize] = 1.0;
        Ok(logits)
    }
}

fn engine(model: Arc<ScriptedModel>, settings: GenerationSettings) -> GenerationEngine {
    GenerationEngine::new(Arc::new(ByteTokenizer), model, settings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn halts_at_token_cap_without_eos() {
    let prompt = "Suggest a snack.";
    let model = ScriptedModel::new(prompt, "la ", true);
    let completion = engine(model.clone(), GenerationSettings::default())
        .generate(prompt, 5)
        .unwrap();

    assert_eq!(completion.generated_tokens, 5);
    assert_eq!(completion.stop_reason, StopReason::TokenCap);
    assert_eq!(model.calls().len(), 5);
}

#[test]
fn stops_at_end_of_sequence() {
    let prompt = "Suggest a snack.";
    let model = ScriptedModel::new(prompt, " Eat dal.", false);
    let completion = engine(model, GenerationSettings::default())
        .generate(prompt, 100)
        .unwrap();

    assert_eq!(completion.stop_reason, StopReason::EndOfSequence);
    // Nine script bytes plus the EOS token.
    assert_eq!(completion.generated_tokens, 10);
    assert_eq!(completion.text, "Eat dal.");
}

#[test]
fn every_step_sees_the_full_sequence() {
    let prompt = "Plan lunch.";
    let model = ScriptedModel::new(prompt, "xyz", true);
    engine(model.clone(), GenerationSettings::default())
        .generate(prompt, 4)
        .unwrap();

    let calls = model.calls();
    for (step, (ids, mask)) in calls.iter().enumerate() {
        assert_eq!(ids.len(), prompt.len() + step);
        assert_eq!(ids.len(), mask.len());
        assert!(mask.iter().all(|&m| m == 1));
        assert_eq!(&ids[..prompt.len()], prompt.as_bytes().iter().map(|&b| u32::from(b)).collect::<Vec<_>>().as_slice());
    }
}

#[test]
fn repeated_sentences_are_cleaned() {
    let prompt = "Advice?";
    let model = ScriptedModel::new(prompt, " Eat dal. EAT DAL. Avoid salt.", false);
    let completion = engine(model, GenerationSettings::default())
        .generate(prompt, 200)
        .unwrap();
    assert_eq!(completion.text, "Eat dal. Avoid salt.");
}

#[test]
fn sentence_limit_comes_from_settings() {
    let prompt = "Advice?";
    let model = ScriptedModel::new(prompt, " One. Two. Three. Four.", false);
    let settings = GenerationSettings {
        max_sentences: 2,
        ..GenerationSettings::default()
    };
    let completion = engine(model, settings).generate(prompt, 200).unwrap();
    assert_eq!(completion.text, "One. Two.");
}

#[test]
fn generation_is_deterministic() {
    let prompt = "Dinner ideas for HbA1c 8.";
    let first = engine(ScriptedModel::new(prompt, " Ragi dosa. Moong dal.", false), GenerationSettings::default())
        .generate(prompt, 64)
        .unwrap();
    let second = engine(ScriptedModel::new(prompt, " Ragi dosa. Moong dal.", false), GenerationSettings::default())
        .generate(prompt, 64)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn answer_suffix_is_encoded_but_stripped() {
    let prompt = "Breakfast?";
    let suffix = " Be brief.";
    let full = format!("{prompt}{suffix}");
    let model = ScriptedModel::new(&full, " Idli.", false);
    let settings = GenerationSettings {
        answer_suffix: Some(suffix.to_owned()),
        ..GenerationSettings::default()
    };
    let completion = engine(model.clone(), settings).generate(prompt, 32).unwrap();

    assert_eq!(model.calls()[0].0.len(), full.len());
    assert_eq!(completion.text, "Idli.");
}

#[test]
fn rejects_empty_prompt_and_zero_budget() {
    let model = ScriptedModel::new("", "a", true);
    let engine = engine(model.clone(), GenerationSettings::default());

    assert!(matches!(
        engine.generate("   ", 10),
        Err(GenerationFault::InvalidRequest(_))
    ));
    assert!(matches!(
        engine.generate("hello", 0),
        Err(GenerationFault::InvalidRequest(_))
    ));
    assert!(model.calls().is_empty());
}

#[test]
fn cancelled_before_first_step() {
    let prompt = "Snack?";
    let model = ScriptedModel::new(prompt, "a", true);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine(model.clone(), GenerationSettings::default())
        .generate_cancellable(prompt, 10, &cancel)
        .unwrap_err();
    assert_eq!(err, GenerationFault::Cancelled);
    assert!(model.calls().is_empty());
}

#[tokio::test]
async fn concurrent_calls_share_one_engine() {
    let prompt = "Snack?";
    let model = ScriptedModel::new(prompt, " Roasted chana.", false);
    let engine = engine(model, GenerationSettings::default());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::task::spawn_blocking(move || engine.generate(prompt, 64)));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().text, "Roasted chana.");
    }
}

#[tokio::test]
async fn local_provider_uses_default_budget() {
    let prompt = "Snack?";
    let model = ScriptedModel::new(prompt, "ab", true);
    let settings = GenerationSettings {
        default_max_new_tokens: 3,
        ..GenerationSettings::default()
    };
    let provider = LocalProvider::new("local", engine(model, settings));

    let reply = provider
        .generate(&GenerationRequest {
            prompt: prompt.to_owned(),
            max_new_tokens: None,
        })
        .await
        .unwrap();
    assert_eq!(reply.num_tokens, Some(3));
    assert_eq!(reply.completion.as_deref(), Some("aba"));
}

#[tokio::test]
async fn local_provider_surfaces_invalid_request() {
    let model = ScriptedModel::new("", "a", true);
    let provider = LocalProvider::new("local", engine(model, GenerationSettings::default()));
    let err = provider
        .generate(&GenerationRequest::new("", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationFault::InvalidRequest(_)));
}
