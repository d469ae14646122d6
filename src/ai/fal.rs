use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::ai::queue::{
    GenerationRequest, JobHandle, JobStatus, QueueApi, QueueApiError, SubmitResponse,
};

const QUEUE_BASE_URL: &str = "https://queue.fal.run";

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// Fal.ai queue endpoints for a single model.
pub struct FalClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl FalClient {
    /// `client` is shared with the rest of the bot for connection pooling and
    /// carries the per-request timeout.
    pub fn new(client: Client, api_key: &str, model: &str) -> Self {
        Self::with_base_url(client, api_key, model, QUEUE_BASE_URL)
    }

    pub fn with_base_url(client: Client, api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.trim_matches('/').to_string(),
        }
    }

    fn submit_url(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }

    fn status_url(&self, job: &JobHandle) -> String {
        format!("{}/{}/requests/{}/status", self.base_url, self.model, job)
    }

    fn result_url(&self, job: &JobHandle) -> String {
        format!("{}/{}/requests/{}", self.base_url, self.model, job)
    }

    fn auth(&self) -> String {
        format!("Key {}", self.api_key)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<T, QueueApiError> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueueApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| QueueApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QueueApi for FalClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitResponse, QueueApiError> {
        let resp = self
            .client
            .post(self.submit_url())
            .header("Authorization", self.auth())
            .json(request)
            .send()
            .await?;

        let status_code = resp.status().as_u16();
        let body = resp.text().await?;
        tracing::debug!("Fal submit to {} returned {}", self.model, status_code);

        Ok(SubmitResponse { status_code, body })
    }

    async fn check_status(&self, job: &JobHandle) -> Result<JobStatus, QueueApiError> {
        let resp: StatusResponse = self.get_json(self.status_url(job)).await?;
        JobStatus::parse(&resp.status)
            .ok_or_else(|| QueueApiError::Decode(format!("unknown job status '{}'", resp.status)))
    }

    async fn fetch_result(&self, job: &JobHandle) -> Result<Value, QueueApiError> {
        self.get_json(self.result_url(job)).await
    }
}
