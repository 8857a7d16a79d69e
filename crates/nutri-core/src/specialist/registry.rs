//! Specialist registry: condition-keyed backends plus the router in front.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::config::NutriSettings;
use crate::generation::GenerationFault;
use crate::router::IntentRouter;

use super::{SpecialistBackend, sentinel};

/// Reply to a free-text chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    /// Name of the condition that answered.
    pub provider: String,
    /// `false` only when the request fell through to the general backend.
    pub specialized: bool,
}

/// A collection of [`SpecialistBackend`]s, keyed by condition.
///
/// # Example
///
/// ```ignore
/// let registry = SpecialistRegistry::from_settings(&NutriSettings::default());
/// let reply = registry.chat("my HbA1c is 8.1").await;
/// assert_eq!(reply.provider, "diabetes");
/// ```
#[derive(Debug, Default)]
pub struct SpecialistRegistry {
    backends: HashMap<Condition, SpecialistBackend>,
    router: IntentRouter,
}

impl SpecialistRegistry {
    /// Empty registry with the standard router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry routing with `router`.
    pub fn with_router(router: IntentRouter) -> Self {
        Self {
            backends: HashMap::new(),
            router,
        }
    }

    /// One HTTP-backed specialist per condition, sharing a connection pool.
    pub fn from_settings(settings: &NutriSettings) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new();
        for condition in Condition::ALL {
            registry.register(SpecialistBackend::from_settings(
                condition,
                &settings.specialist(condition),
                client.clone(),
            ));
        }
        registry
    }

    /// Register a backend under its condition, returning any it replaced.
    pub fn register(&mut self, backend: SpecialistBackend) -> Option<SpecialistBackend> {
        self.backends.insert(backend.condition(), backend)
    }

    pub fn get(&self, condition: Condition) -> Option<&SpecialistBackend> {
        self.backends.get(&condition)
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    /// Registered conditions in [`Condition::ALL`] order.
    pub fn conditions(&self) -> Vec<Condition> {
        Condition::ALL
            .into_iter()
            .filter(|c| self.backends.contains_key(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Ask `condition`'s specialist. An unregistered condition yields
    /// sentinel text like any other fault.
    pub async fn respond(&self, condition: Condition, user_message: &str) -> String {
        match self.get(condition) {
            Some(backend) => backend.respond(user_message).await,
            None => {
                let fault = GenerationFault::ProviderUnreachable("no backend registered".to_owned());
                tracing::warn!(%condition, "no specialist registered");
                sentinel(condition, &fault)
            }
        }
    }

    /// Route `text` and answer it with the chosen specialist.
    pub async fn chat(&self, text: &str) -> ChatReply {
        let condition = self.router.classify(text);
        tracing::info!(%condition, "routed chat message");
        ChatReply {
            reply: self.respond(condition, text).await,
            provider: condition.to_string(),
            specialized: condition.is_specialized(),
        }
    }
}
