//! Generation providers: the fixed interface specialists talk to.
//!
//! A provider takes a prompt and a token budget and returns a
//! [`ProviderReply`], a loosely structured result with several possible
//! text fields. Two implementations ship here:
//!
//! - [`HttpProvider`] posts `{"prompt", "max_new_tokens"}` to a remote
//!   generation service, or the lipids planner's body (see
//!   [`RequestFormat`]).
//! - [`LocalProvider`] runs a [`crate::generation::GenerationEngine`] on the
//!   blocking thread pool.

pub mod http;
pub mod local;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generation::GenerationFault;

pub use http::HttpProvider;
pub use local::LocalProvider;

/// Body of a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_new_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens: Some(max_new_tokens),
        }
    }
}

/// A text-bearing field a provider may populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyField {
    Plan,
    Completion,
    Text,
    Output,
}

impl ReplyField {
    pub fn key(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Completion => "completion",
            Self::Text => "text",
            Self::Output => "output",
        }
    }
}

/// Wire shape of the body an [`HttpProvider`] posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestFormat {
    /// `{"prompt", "max_new_tokens"}`.
    #[default]
    Generate,
    /// The lipids planner's `{age, sex, ldl, hdl, tg, comorbidities, notes}`.
    /// The planner owns its system prompt, so only the patient's message
    /// travels, in `notes`.
    LipidsPlan,
}

impl RequestFormat {
    /// Whether the specialist's system prompt is sent with the message.
    pub fn sends_system_prompt(self) -> bool {
        matches!(self, Self::Generate)
    }
}

impl fmt::Display for RequestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Generate => "generate",
            Self::LipidsPlan => "lipids-plan",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RequestFormat {
    type Err = RequestFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(Self::Generate),
            "lipids-plan" => Ok(Self::LipidsPlan),
            other => Err(RequestFormatParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFormatParseError(pub String);

impl fmt::Display for RequestFormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request format: {:?}", self.0)
    }
}

impl std::error::Error for RequestFormatParseError {}

/// Body of the lipids planner. Lab values are neutral placeholders until a
/// structured profile is routed here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LipidsPlanRequest {
    pub age: u32,
    pub sex: String,
    pub ldl: f64,
    pub hdl: f64,
    pub tg: f64,
    pub comorbidities: Vec<String>,
    pub notes: String,
}

impl LipidsPlanRequest {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            age: 60,
            sex: "M".to_owned(),
            ldl: 150.0,
            hdl: 40.0,
            tg: 200.0,
            comorbidities: Vec::new(),
            notes: notes.into(),
        }
    }
}

/// What a provider returned. Unknown fields are ignored, and so are known
/// fields that are not strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_tokens: Option<u64>,
}

impl ProviderReply {
    /// Reply carrying only a `completion`.
    pub fn completion(text: impl Into<String>) -> Self {
        Self {
            completion: Some(text.into()),
            ..Self::default()
        }
    }

    /// Pick the recognized fields out of a JSON object. Returns `None` when
    /// `value` is not an object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
        Some(Self {
            plan: text_field("plan"),
            completion: text_field("completion"),
            text: text_field("text"),
            output: text_field("output"),
            num_tokens: object.get("num_tokens").and_then(Value::as_u64),
        })
    }

    pub fn field(&self, field: ReplyField) -> Option<&str> {
        match field {
            ReplyField::Plan => self.plan.as_deref(),
            ReplyField::Completion => self.completion.as_deref(),
            ReplyField::Text => self.text.as_deref(),
            ReplyField::Output => self.output.as_deref(),
        }
    }

    /// The first field in `priority` whose trimmed text is non-empty.
    pub fn first_text(&self, priority: &[ReplyField]) -> Option<&str> {
        priority
            .iter()
            .filter_map(|f| self.field(*f))
            .map(str::trim)
            .find(|t| !t.is_empty())
    }
}

/// Anything that can turn a [`GenerationRequest`] into a [`ProviderReply`].
///
/// Object-safe so specialists can hold `Arc<dyn GenerationProvider>`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short identifier used in logs (e.g. the endpoint URL).
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderReply, GenerationFault>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn GenerationProvider) {}
};
