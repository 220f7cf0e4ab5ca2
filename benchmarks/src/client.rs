//! HTTP client for the polyglot API.

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use crate::throttle;

/// A single failed call. Counted by the scenarios, never retried.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("body read failed: {0}")]
    Body(#[from] std::io::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResponse {
    pub experiment_id: String,
    pub selected_payload_name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PolyglotClient {
    http: reqwest::Client,
    base_url: String,
}

impl PolyglotClient {
    /// `timeout` bounds each whole request, body included.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<(), RequestError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(RequestError::Status(resp.status()));
        }
        Ok(())
    }

    async fn post_experiment(&self, user_id: &str) -> Result<reqwest::Response, RequestError> {
        let resp = self
            .http
            .post(format!("{}/experiment", self.base_url))
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(RequestError::Status(resp.status()));
        }
        Ok(resp)
    }

    /// Request an assignment and decode it.
    pub async fn assign(&self, user_id: &str) -> Result<ExperimentResponse, RequestError> {
        let body = self.post_experiment(user_id).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Request an assignment and read the body as fast as possible.
    pub async fn fetch(&self, user_id: &str) -> Result<u64, RequestError> {
        let body = self.post_experiment(user_id).await?.bytes().await?;
        Ok(body.len() as u64)
    }

    /// Request an assignment and read the body at about `bytes_per_sec`.
    pub async fn fetch_throttled(
        &self,
        user_id: &str,
        bytes_per_sec: u64,
    ) -> Result<u64, RequestError> {
        let resp = self.post_experiment(user_id).await?;
        let body = StreamReader::new(resp.bytes_stream().map_err(std::io::Error::other));
        Ok(throttle::read_throttled(body, bytes_per_sec).await?)
    }
}
