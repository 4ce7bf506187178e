//! Client for the training endpoint.
//!
//! The service trains the model and scores it; this side only sends the
//! request and decodes what comes back.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog;
use crate::config::Config;
use crate::logging::log_request;
use crate::result::{RawResult, TrainResponse};

pub mod retry;

use retry::{is_retryable_http_error, is_retryable_network_error, retry_async, RetryConfig};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainRequest {
    pub dataset_id: String,
    pub algorithm: String,
    pub target_column: String,
    /// Passed through to the estimator constructor.
    pub parameters: Map<String, Value>,
}

impl TrainRequest {
    /// Dataset and algorithm are always required; the target column only
    /// for algorithms that are not clustering.
    pub fn validate(&self) -> Result<()> {
        if self.dataset_id.trim().is_empty() || self.algorithm.trim().is_empty() {
            bail!("select a dataset and an algorithm");
        }
        let needs_target = catalog::algorithm(&self.algorithm)
            .map(|a| a.kind.needs_target())
            .unwrap_or(true);
        if needs_target && self.target_column.trim().is_empty() {
            bail!("select a target column (optional for clustering)");
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("training endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Status { status, .. } => is_retryable_http_error(*status),
            ClientError::Transport(e) => is_retryable_network_error(e),
        }
    }
}

fn retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ClientError>()
        .map(ClientError::is_retryable)
        .unwrap_or(false)
}

/// Error body shape used by the API gateway on non-2xx responses.
#[derive(Deserialize)]
struct GatewayError {
    message: Option<String>,
    error: Option<String>,
}

pub struct TrainingClient {
    client: Client,
    base: String,
    retry: RetryConfig,
}

impl TrainingClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.http_timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base: cfg.api_base.trim_end_matches('/').to_string(),
            retry: RetryConfig::from(cfg),
        })
    }

    fn train_url(&self) -> String {
        format!("{}/api/ml/train", self.base)
    }

    pub async fn train(&self, req: &TrainRequest) -> Result<RawResult> {
        req.validate()?;
        let mut attempt = 0u32;
        let response = retry_async(&self.retry, "train", retryable, || {
            attempt += 1;
            self.send(req, attempt)
        })
        .await?;
        response.into_result()
    }

    async fn send(&self, req: &TrainRequest, attempt: u32) -> Result<TrainResponse> {
        let resp = self
            .client
            .post(self.train_url())
            .json(req)
            .send()
            .await
            .map_err(ClientError::from)?;
        let status = resp.status();
        log_request(&req.algorithm, &req.dataset_id, attempt, Some(status.as_u16()));

        let body = resp.bytes().await.map_err(ClientError::from)?;
        if !status.is_success() {
            let message = serde_json::from_slice::<GatewayError>(&body)
                .ok()
                .and_then(|e| e.message.or(e.error))
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        serde_json::from_slice(&body).context("decoding training response")
    }
}
