//! JSON-over-HTTP transport shared by the remote providers.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error): retry
//! - HTTP 4xx (client error, not 429): fail immediately
//! - Network errors and timeouts: retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! A call whose final attempt timed out fails with
//! [`ProviderTimeout`] so the core can report it as a timeout rather
//! than a generic provider failure.

use anyhow::{anyhow, bail, Result};
use rag_engine_core::ProviderTimeout;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub struct JsonClient {
    client: reqwest::Client,
    /// Provider label used in error messages (e.g. `"Gemini"`).
    label: &'static str,
    timeout_secs: u64,
    max_retries: u32,
}

impl JsonClient {
    pub fn new(label: &'static str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            label,
            timeout_secs,
            max_retries,
        })
    }

    /// POST `body` to `url` and return the decoded JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            let response = match request.json(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(provider = self.label, attempt, error = %e, "request failed");
                    last_err = Some(self.transport_error(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json().await.map_err(|e| self.transport_error(e));
            }

            let body_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                warn!(provider = self.label, attempt, %status, "retryable API error");
                last_err = Some(anyhow!("{} API error {}: {}", self.label, status, body_text));
                continue;
            }

            bail!("{} API error {}: {}", self.label, status, body_text);
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", self.label)))
    }

    fn transport_error(&self, err: reqwest::Error) -> anyhow::Error {
        if err.is_timeout() {
            anyhow::Error::new(ProviderTimeout {
                secs: self.timeout_secs,
            })
        } else {
            anyhow!("{} connection error: {}", self.label, err)
        }
    }
}

/// Read a JSON array of numbers as an embedding vector.
pub fn parse_vector(value: &Value, what: &str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid {} response: non-numeric embedding value", what))
        })
        .collect()
}

/// Read the API key for a provider from the environment.
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}
