use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::ProviderConfig;
use hotelrag_core::ModelError;

use crate::retry::RetryPolicy;

/// Authenticated HTTP transport shared by every provider client.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    api_key: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl ProviderClient {
    pub fn new(api_key: impl Into<String>, request_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { http, api_key: api_key.into(), request_timeout, retry })
    }

    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let key = cfg
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("provider.api_key is not set (or export DASHSCOPE_API_KEY)"))?;
        Self::new(key, Duration::from_millis(cfg.request_timeout_ms), RetryPolicy::from_config(cfg))
    }

    pub fn retry(&self) -> &RetryPolicy { &self.retry }

    /// POST a JSON body and decode a JSON reply, retrying transient failures.
    pub async fn post_json<Req, Resp>(&self, url: &str, body: &Req, cancel: &CancellationToken) -> Result<Resp, ModelError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.retry
            .run(url, cancel, move || async move {
                let resp = self
                    .http
                    .post(url)
                    .bearer_auth(&self.api_key)
                    .timeout(self.request_timeout)
                    .json(body)
                    .send()
                    .await
                    .map_err(transport_error)?;
                let resp = check_status(resp).await?;
                resp.json::<Resp>().await.map_err(|e| ModelError::Decode(e.to_string()))
            })
            .await
    }

    /// POST a JSON body and hand back the open response for incremental reads.
    /// Only connection setup is retried; the body has no overall timeout.
    pub async fn post_streaming<Req>(&self, url: &str, body: &Req, cancel: &CancellationToken) -> Result<reqwest::Response, ModelError>
    where
        Req: Serialize + Sync,
    {
        self.retry
            .run(url, cancel, move || async move {
                let resp = self
                    .http
                    .post(url)
                    .bearer_auth(&self.api_key)
                    .header(reqwest::header::ACCEPT, "text/event-stream")
                    .json(body)
                    .send()
                    .await
                    .map_err(transport_error)?;
                check_status(resp).await
            })
            .await
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout
    } else {
        ModelError::Transport(e.to_string())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status.as_u16() {
        429 => Err(ModelError::RateLimited),
        408 | 504 => Err(ModelError::Timeout),
        code => {
            let message = resp.text().await.unwrap_or_default();
            Err(ModelError::Provider { status: code, message })
        }
    }
}
