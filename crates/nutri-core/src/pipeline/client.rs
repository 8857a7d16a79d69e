//! Transport seam between the pipeline and the stage services.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ConfigError, StageEndpoints, StageTimeouts};
use crate::provider::http::truncate;

use super::{Stage, StageError};

const ERROR_BODY_LIMIT: usize = 512;

/// Sends one stage request and returns the raw JSON reply.
///
/// Implementations report transport and HTTP problems as [`StageError`];
/// envelope and schema checks happen in the pipeline.
#[async_trait]
pub trait StageClient: Send + Sync {
    async fn call(&self, stage: Stage, payload: &Value) -> Result<Value, StageError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn StageClient) {}
};

/// [`StageClient`] over HTTP with connect and overall timeouts.
#[derive(Debug, Clone)]
pub struct HttpStageClient {
    client: reqwest::Client,
    endpoints: StageEndpoints,
}

impl HttpStageClient {
    pub fn new(endpoints: StageEndpoints, timeouts: StageTimeouts) -> Result<Self, ConfigError> {
        if timeouts.connect >= timeouts.request {
            return Err(ConfigError::ConnectTimeoutNotShorter {
                connect: timeouts.connect,
                request: timeouts.request,
            });
        }
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn call(&self, stage: Stage, payload: &Value) -> Result<Value, StageError> {
        let url = self.endpoints.url_for(stage);
        tracing::debug!(%stage, %url, "calling stage service");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Status {
                code: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT).to_owned(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                StageError::Timeout
            } else {
                StageError::Malformed(format!("{} response is not JSON: {e}", stage.schema()))
            }
        })
    }
}

fn transport_error(err: reqwest::Error) -> StageError {
    if err.is_timeout() {
        StageError::Timeout
    } else {
        StageError::Unreachable(err.to_string())
    }
}
