//! Condition specialists.
//!
//! A [`SpecialistBackend`] wraps a [`GenerationProvider`] with one
//! condition's system prompt, token budget and reply-field priority. Its
//! public contract always produces text: provider faults become a visible
//! sentinel string naming the condition.
//!
//! ```text
//! SpecialistRegistry --get(Condition)--> &SpecialistBackend
//!     |                                       |
//!     | chat(text)                            | respond(message)
//!     |   classify -> respond                 |   build_prompt -> provider.generate
//!     v                                       v
//! ChatReply { reply, provider, specialized }  String (reply or sentinel)
//! ```

pub mod prompts;
pub mod registry;

use std::sync::Arc;

use crate::condition::Condition;
use crate::config::SpecialistSettings;
use crate::generation::GenerationFault;
use crate::provider::{
    GenerationProvider, GenerationRequest, HttpProvider, ProviderReply, ReplyField, RequestFormat,
};

pub use registry::{ChatReply, SpecialistRegistry};

const DEFAULT_FIELDS: &[ReplyField] = &[ReplyField::Completion, ReplyField::Text, ReplyField::Output];

const LIPIDS_FIELDS: &[ReplyField] = &[
    ReplyField::Plan,
    ReplyField::Completion,
    ReplyField::Text,
    ReplyField::Output,
];

/// Reply fields read for `condition`, highest priority first.
pub fn reply_fields(condition: Condition) -> &'static [ReplyField] {
    match condition {
        Condition::Lipids => LIPIDS_FIELDS,
        _ => DEFAULT_FIELDS,
    }
}

/// The text returned in place of a hard failure.
pub fn sentinel(condition: Condition, fault: &GenerationFault) -> String {
    format!("[{} specialist error: {fault}]", condition.label())
}

/// One condition's prompt shaping and reply extraction.
#[derive(Clone)]
pub struct SpecialistBackend {
    condition: Condition,
    provider: Arc<dyn GenerationProvider>,
    max_new_tokens: u32,
    format: RequestFormat,
}

impl SpecialistBackend {
    pub fn new(
        condition: Condition,
        provider: Arc<dyn GenerationProvider>,
        max_new_tokens: u32,
    ) -> Self {
        Self {
            condition,
            provider,
            max_new_tokens,
            format: RequestFormat::Generate,
        }
    }

    /// Shape prompts for a provider speaking `format`.
    pub fn with_format(mut self, format: RequestFormat) -> Self {
        self.format = format;
        self
    }

    /// Backend talking HTTP to the endpoint in `settings`.
    pub fn from_settings(
        condition: Condition,
        settings: &SpecialistSettings,
        client: reqwest::Client,
    ) -> Self {
        let provider = HttpProvider::with_client(client, settings.url.clone(), settings.timeout)
            .with_format(settings.format);
        Self::new(condition, Arc::new(provider), settings.max_new_tokens)
            .with_format(settings.format)
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn max_new_tokens(&self) -> u32 {
        self.max_new_tokens
    }

    /// The text sent to the provider. Providers that own their system
    /// prompt receive only the trimmed message.
    pub fn build_prompt(&self, user_message: &str) -> String {
        if self.format.sends_system_prompt() {
            prompts::build_prompt(self.condition, user_message)
        } else {
            user_message.trim().to_owned()
        }
    }

    /// Pull the reply text out of a provider result.
    pub fn extract(&self, reply: &ProviderReply) -> Result<String, GenerationFault> {
        reply
            .first_text(reply_fields(self.condition))
            .map(str::to_owned)
            .ok_or(GenerationFault::NoContent)
    }

    /// Generate a reply, surfacing faults to the caller.
    pub async fn try_respond(&self, user_message: &str) -> Result<String, GenerationFault> {
        let request = GenerationRequest::new(self.build_prompt(user_message), self.max_new_tokens);
        let reply = self.provider.generate(&request).await?;
        self.extract(&reply)
    }

    /// Generate a reply. Never fails: faults come back as sentinel text.
    pub async fn respond(&self, user_message: &str) -> String {
        match self.try_respond(user_message).await {
            Ok(text) => text,
            Err(fault) => {
                tracing::warn!(
                    condition = %self.condition,
                    provider = %self.provider.name(),
                    error = %fault,
                    "specialist fault converted to sentinel text"
                );
                sentinel(self.condition, &fault)
            }
        }
    }
}

impl std::fmt::Debug for SpecialistBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistBackend")
            .field("condition", &self.condition)
            .field("provider", &self.provider.name())
            .field("max_new_tokens", &self.max_new_tokens)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider returning a canned result and recording requests.
    struct CannedProvider {
        result: Result<ProviderReply, GenerationFault>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl CannedProvider {
        fn new(result: Result<ProviderReply, GenerationFault>) -> Arc<Self> {
            Arc::new(Self {
                result,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<ProviderReply, GenerationFault> {
            self.requests.lock().unwrap().push(request.clone());
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn respond_returns_trimmed_completion() {
        let provider = CannedProvider::new(Ok(ProviderReply::completion("  Breakfast: idli.  ")));
        let backend = SpecialistBackend::new(Condition::Diabetes, provider.clone(), 160);

        let reply = backend.respond("my sugar is high").await;
        assert_eq!(reply, "Breakfast: idli.");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_new_tokens, Some(160));
        assert!(requests[0].prompt.contains("Patient request:\nmy sugar is high"));
    }

    #[tokio::test]
    async fn fault_becomes_sentinel_with_condition_name() {
        let provider = CannedProvider::new(Err(GenerationFault::Timeout));
        let backend = SpecialistBackend::new(Condition::Hypertension, provider, 256);

        let reply = backend.respond("bp 150/95").await;
        assert_eq!(reply, "[Hypertension specialist error: provider timed out]");
    }

    #[tokio::test]
    async fn empty_reply_is_no_content_sentinel() {
        let provider = CannedProvider::new(Ok(ProviderReply::default()));
        let backend = SpecialistBackend::new(Condition::Kidney, provider, 200);

        let err = backend.try_respond("ckd diet").await.unwrap_err();
        assert_eq!(err, GenerationFault::NoContent);

        let reply = backend.respond("ckd diet").await;
        assert!(reply.starts_with("[Kidney specialist error:"));
        assert!(!reply.is_empty());
    }

    #[test]
    fn planner_format_sends_bare_message() {
        let provider = CannedProvider::new(Ok(ProviderReply::default()));
        let generic = SpecialistBackend::new(Condition::Lipids, provider.clone(), 200);
        let planner = generic.clone().with_format(RequestFormat::LipidsPlan);

        assert!(generic.build_prompt("  LDL 190 ").contains("Patient request:\nLDL 190"));
        assert_eq!(planner.build_prompt("  LDL 190 "), "LDL 190");
    }

    #[tokio::test]
    async fn lipids_prefers_plan_field() {
        let reply = ProviderReply {
            plan: Some("lipid plan".to_owned()),
            completion: Some("completion text".to_owned()),
            ..ProviderReply::default()
        };
        let lipids = SpecialistBackend::new(Condition::Lipids, CannedProvider::new(Ok(reply.clone())), 200);
        let diabetes = SpecialistBackend::new(Condition::Diabetes, CannedProvider::new(Ok(reply)), 160);

        assert_eq!(lipids.respond("ldl").await, "lipid plan");
        assert_eq!(diabetes.respond("glucose").await, "completion text");
    }
}
