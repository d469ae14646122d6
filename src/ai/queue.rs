use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output resolution class understood by the Stable Diffusion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSize {
    SquareHd,
    Square,
    #[serde(rename = "portrait_4_3")]
    Portrait4x3,
    #[serde(rename = "portrait_16_9")]
    Portrait16x9,
    #[serde(rename = "landscape_4_3")]
    Landscape4x3,
    #[serde(rename = "landscape_16_9")]
    Landscape16x9,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("num_images must be at least 1")]
    NoImages,
}

/// A single text-to-image job. Built once per user request and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    prompt: String,
    image_size: ImageSize,
    num_inference_steps: u32,
    guidance_scale: f32,
    num_images: u32,
    enable_safety_checker: bool,
}

impl GenerationRequest {
    /// Build a request with the bot's fixed generation parameters.
    pub fn new(prompt: &str) -> Result<Self, InvalidRequest> {
        Self::with_params(prompt, ImageSize::SquareHd, 28, 3.5, 1, true)
    }

    pub fn with_params(
        prompt: &str,
        image_size: ImageSize,
        num_inference_steps: u32,
        guidance_scale: f32,
        num_images: u32,
        enable_safety_checker: bool,
    ) -> Result<Self, InvalidRequest> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(InvalidRequest::EmptyPrompt);
        }
        if num_images == 0 {
            return Err(InvalidRequest::NoImages);
        }
        Ok(Self {
            prompt: prompt.to_string(),
            image_size,
            num_inference_steps,
            guidance_scale,
            num_images,
            enable_safety_checker,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Opaque identifier the queue hands back when it accepts a job.
///
/// Not `Clone`: the poll loop takes ownership, one loop per handle.
#[derive(Debug, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Externally reported job state. The client never computes transitions
/// itself; it only maps the latest string from the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Map a remote status string. Returns `None` for anything unrecognised.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "QUEUED" | "PENDING" => Some(Self::Queued),
            "IN_PROGRESS" | "PROCESSING" | "RUNNING" => Some(Self::InProgress),
            "COMPLETED" | "SUCCEEDED" => Some(Self::Completed),
            "FAILED" | "ERROR" => Some(Self::Failed),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageArtifact {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Finished job output. Everything besides `images` is kept verbatim in
/// `metadata` for the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationResult {
    pub images: Vec<ImageArtifact>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl GenerationResult {
    /// Parse a result body. A result without any image is not a result.
    pub fn from_json(body: Value) -> Result<Self, String> {
        let result: Self = serde_json::from_value(body).map_err(|e| e.to_string())?;
        if result.images.is_empty() {
            return Err("result contains no images".to_string());
        }
        Ok(result)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|i| i.url.as_str())
    }
}

/// Raw reply to a submission, before the poller interprets it.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub status_code: u16,
    pub body: String,
}

/// Errors from a single call against the queue API.
#[derive(Debug, thiserror::Error)]
pub enum QueueApiError {
    /// The request never produced an HTTP response (connect, DNS, TLS,
    /// per-request timeout).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("queue API error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl QueueApiError {
    /// Whether the same call may succeed if simply repeated later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for QueueApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The three operations of a submit-then-poll generation service.
#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmitResponse, QueueApiError>;

    async fn check_status(&self, job: &JobHandle) -> Result<JobStatus, QueueApiError>;

    async fn fetch_result(&self, job: &JobHandle) -> Result<Value, QueueApiError>;
}
