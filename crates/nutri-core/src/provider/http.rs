//! Remote generation over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::generation::GenerationFault;

use super::{GenerationProvider, GenerationRequest, LipidsPlanRequest, ProviderReply, RequestFormat};

/// Longest slice of an error body carried into a fault message.
const ERROR_BODY_LIMIT: usize = 512;

/// Posts JSON to a generation service and reads the reply fields.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    format: RequestFormat,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), url, timeout)
    }

    /// Share a connection pool with other providers.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
            format: RequestFormat::Generate,
        }
    }

    pub fn with_format(mut self, format: RequestFormat) -> Self {
        self.format = format;
        self
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.url
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderReply, GenerationFault> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request_body(self.format, request)?)
            .send()
            .await
            .map_err(transport_fault)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationFault::ProviderError(format!(
                "HTTP {status}: {}",
                truncate(&body, ERROR_BODY_LIMIT)
            )));
        }

        let value: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationFault::Timeout
            } else {
                GenerationFault::ProviderError(format!("malformed response: {e}"))
            }
        })?;

        ProviderReply::from_json(&value).ok_or_else(|| {
            GenerationFault::ProviderError("response is not a JSON object".to_owned())
        })
    }
}

fn request_body(format: RequestFormat, request: &GenerationRequest) -> Result<Value, GenerationFault> {
    let body = match format {
        RequestFormat::Generate => serde_json::to_value(request),
        RequestFormat::LipidsPlan => {
            serde_json::to_value(LipidsPlanRequest::with_notes(request.prompt.as_str()))
        }
    };
    body.map_err(|e| GenerationFault::InvalidRequest(e.to_string()))
}

fn transport_fault(err: reqwest::Error) -> GenerationFault {
    if err.is_timeout() {
        GenerationFault::Timeout
    } else if err.is_connect() || err.is_request() {
        GenerationFault::ProviderUnreachable(err.to_string())
    } else {
        GenerationFault::ProviderError(err.to_string())
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
