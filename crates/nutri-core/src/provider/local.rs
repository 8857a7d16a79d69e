//! In-process generation backed by a [`GenerationEngine`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::generation::{GenerationEngine, GenerationFault};

use super::{GenerationProvider, GenerationRequest, ProviderReply};

/// Runs the decode loop on tokio's blocking pool.
///
/// Dropping the `generate` future cancels the decode at its next step.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    name: String,
    engine: GenerationEngine,
}

impl LocalProvider {
    pub fn new(name: impl Into<String>, engine: GenerationEngine) -> Self {
        Self {
            name: name.into(),
            engine,
        }
    }
}

#[async_trait]
impl GenerationProvider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderReply, GenerationFault> {
        let engine = self.engine.clone();
        let prompt = request.prompt.clone();
        let max_new_tokens = request
            .max_new_tokens
            .unwrap_or(engine.settings().default_max_new_tokens);

        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let completion = tokio::task::spawn_blocking(move || {
            engine.generate_cancellable(&prompt, max_new_tokens, &cancel)
        })
        .await
        .map_err(|e| GenerationFault::Inference(format!("generation task failed: {e}")))??;

        guard.disarm();

        Ok(ProviderReply {
            completion: Some(completion.text),
            num_tokens: Some(completion.generated_tokens as u64),
            ..ProviderReply::default()
        })
    }
}
