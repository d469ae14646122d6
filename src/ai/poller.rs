//! Submit-then-poll client for queue based generation services.
//!
//! [`JobPoller::submit_and_await`] hides the two phase protocol behind a
//! single call: submit the job, observe its status under a bounded attempt
//! budget, fetch the output once it completes. Every remote or network
//! failure comes back as a [`JobError`]; nothing from the transport layer
//! escapes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ai::queue::{
    GenerationRequest, GenerationResult, JobHandle, JobStatus, QueueApi, QueueApiError,
    SubmitResponse,
};

/// Why a generation did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The remote broke the submit/poll contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Submission answered with something other than 200/202.
    #[error("request rejected ({status_code}): {body}")]
    RequestRejected { status_code: u16, body: String },

    /// Submission never got an HTTP response.
    #[error("could not reach generation service: {0}")]
    Transport(String),

    /// The remote marked the job as failed or cancelled.
    #[error("job {status}")]
    JobFailed { status: JobStatus },

    /// The job completed but its output could not be retrieved or parsed.
    #[error("could not fetch result: {0}")]
    ResultFetch(String),

    /// The job was still pending when the budget ran out.
    #[error("job still pending after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    /// The caller cancelled the wait.
    #[error("polling aborted")]
    Aborted,
}

impl JobError {
    /// Whether the caller may reasonably retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PollTimeout { .. } | Self::Transport(_))
    }
}

enum Submission {
    Immediate(GenerationResult),
    Queued(JobHandle),
}

/// Shared, stateless driver over a [`QueueApi`]. Cheap to clone; concurrent
/// calls share nothing but the underlying HTTP client.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn QueueApi>,
}

impl JobPoller {
    pub fn new(api: Arc<dyn QueueApi>) -> Self {
        Self { api }
    }

    pub async fn submit_and_await(
        &self,
        request: &GenerationRequest,
        max_attempts: u32,
        poll_interval: Duration,
        overall_timeout: Duration,
    ) -> Result<GenerationResult, JobError> {
        let max_attempts = max_attempts.max(1);
        let mut attempts = 0u32;

        let outcome = tokio::time::timeout(
            overall_timeout,
            self.run(request, max_attempts, poll_interval, &mut attempts),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    attempts,
                    timeout_secs = overall_timeout.as_secs(),
                    "Generation timed out"
                );
                Err(JobError::PollTimeout { attempts })
            }
        }
    }

    /// Same as [`submit_and_await`](Self::submit_and_await), but stops as soon
    /// as `cancel` fires. The in-flight request is dropped; the remote job
    /// may keep running server-side.
    pub async fn submit_and_await_cancellable(
        &self,
        request: &GenerationRequest,
        max_attempts: u32,
        poll_interval: Duration,
        overall_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, JobError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Generation wait cancelled");
                Err(JobError::Aborted)
            }
            res = self.submit_and_await(
                request,
                max_attempts,
                poll_interval,
                overall_timeout,
            ) => res,
        }
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        max_attempts: u32,
        poll_interval: Duration,
        attempts: &mut u32,
    ) -> Result<GenerationResult, JobError> {
        let response = self.api.submit(request).await.map_err(|e| match e {
            QueueApiError::Http { status, body } => JobError::RequestRejected {
                status_code: status,
                body,
            },
            other => JobError::Transport(other.to_string()),
        })?;

        match interpret_submission(response)? {
            Submission::Immediate(result) => {
                tracing::info!(images = result.images.len(), "Generation returned synchronously");
                Ok(result)
            }
            Submission::Queued(job) => {
                tracing::info!(job_id = %job, "Generation queued");
                self.poll(job, max_attempts, poll_interval, attempts).await
            }
        }
    }

    async fn poll(
        &self,
        job: JobHandle,
        max_attempts: u32,
        poll_interval: Duration,
        attempts: &mut u32,
    ) -> Result<GenerationResult, JobError> {
        for attempt in 1..=max_attempts {
            *attempts = attempt;

            match self.api.check_status(&job).await {
                Ok(JobStatus::Completed) => {
                    tracing::info!(job_id = %job, attempt, "Job completed");
                    return self.fetch(&job).await;
                }
                Ok(status @ (JobStatus::Failed | JobStatus::Cancelled)) => {
                    tracing::warn!(job_id = %job, attempt, %status, "Job ended remotely");
                    return Err(JobError::JobFailed { status });
                }
                Ok(status) => {
                    tracing::debug!(job_id = %job, attempt, %status, "Job pending");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(job_id = %job, attempt, "Status check failed, retrying: {}", e);
                }
                Err(e) => {
                    return Err(JobError::Protocol(format!("status check failed: {e}")));
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(poll_interval).await;
            }
        }

        tracing::warn!(job_id = %job, max_attempts, "Poll budget exhausted");
        Err(JobError::PollTimeout {
            attempts: max_attempts,
        })
    }

    /// Fetch a completed job's output. One extra try on a transient error;
    /// anything else is final.
    async fn fetch(&self, job: &JobHandle) -> Result<GenerationResult, JobError> {
        let body = match self.api.fetch_result(job).await {
            Ok(body) => body,
            Err(e) if e.is_transient() => {
                tracing::warn!(job_id = %job, "Result fetch failed, retrying once: {}", e);
                self.api
                    .fetch_result(job)
                    .await
                    .map_err(|e| JobError::ResultFetch(e.to_string()))?
            }
            Err(e) => return Err(JobError::ResultFetch(e.to_string())),
        };

        GenerationResult::from_json(body).map_err(JobError::ResultFetch)
    }
}

fn interpret_submission(response: SubmitResponse) -> Result<Submission, JobError> {
    if !matches!(response.status_code, 200 | 202) {
        return Err(JobError::RequestRejected {
            status_code: response.status_code,
            body: response.body,
        });
    }

    let body: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);

    if response.status_code == 200 && body.get("images").is_some() {
        return GenerationResult::from_json(body)
            .map(Submission::Immediate)
            .map_err(|e| JobError::Protocol(format!("malformed synchronous result: {e}")));
    }

    body.get("request_id")
        .or_else(|| body.get("job_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(|id| Submission::Queued(JobHandle::new(id)))
        .ok_or_else(|| JobError::Protocol("accepted response missing job identifier".to_string()))
}
