use crate::{GateError, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for calls leaving the dispatcher: job bodies to worker
/// clusters and completion notices to original callers.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| GateError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self { client })
    }

    /// POST `body` to `{cluster_url}/calculate` with the caller's query parameters.
    pub async fn forward_calculation(
        &self,
        cluster_name: &str,
        cluster_url: &str,
        body: String,
        query: &BTreeMap<String, String>,
    ) -> Result<()> {
        let url = format!("{}/calculate", cluster_url.trim_end_matches('/'));

        self.client
            .post(&url)
            .query(query)
            .body(body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                GateError::Upstream(format!(
                    "Error forwarding request to {}: {}",
                    cluster_name, e
                ))
            })?;

        tracing::debug!("Forwarded calculation to {} at {}", cluster_name, url);
        Ok(())
    }

    /// POST the worker's callback payload, unchanged, to the original caller.
    pub async fn forward_callback(
        &self,
        callback_url: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.client
            .post(callback_url)
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| GateError::Upstream(format!("Error forwarding callback: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT, DEFAULT_CONNECT_TIMEOUT).unwrap()
    }
}
