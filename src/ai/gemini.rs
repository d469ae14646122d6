use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType", alias = "mime_type", default = "default_mime_type")]
    mime_type: String,
    data: String,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

/// One piece of a Gemini reply, already decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Image { mime_type: String, data: Vec<u8> },
    Text(String),
}

/// Pull the first image out of a reply, if any, as `(mime_type, bytes)`.
pub fn first_image(parts: &[ResponsePart]) -> Option<(&str, &[u8])> {
    parts.iter().find_map(|p| match p {
        ResponsePart::Image { mime_type, data } => Some((mime_type.as_str(), data.as_slice())),
        ResponsePart::Text(_) => None,
    })
}

/// All text parts joined with newlines. Empty when the reply had no text.
pub fn joined_text(parts: &[ResponsePart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ResponsePart::Text(t) => Some(t.trim()),
            ResponsePart::Image { .. } => None,
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flatten the first candidate into tagged parts. Inline data that is not
/// valid base64 is dropped with a warning.
fn into_parts(resp: GeminiResponse) -> Vec<ResponsePart> {
    let Some(content) = resp.candidates.into_iter().next().and_then(|c| c.content) else {
        return Vec::new();
    };

    let mut parts = Vec::new();
    for part in content.parts {
        if let Some(inline) = part.inline_data {
            match BASE64.decode(inline.data.as_bytes()) {
                Ok(data) => parts.push(ResponsePart::Image {
                    mime_type: inline.mime_type,
                    data,
                }),
                Err(e) => tracing::warn!("Skipping undecodable inline image: {}", e),
            }
        }
        if let Some(text) = part.text {
            parts.push(ResponsePart::Text(text));
        }
    }
    parts
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            api_key: config.google_api_key.clone(),
            text_model: config.gemini_text_model.clone(),
            image_model: config.gemini_image_model.clone(),
        }
    }

    /// Plain text completion.
    pub async fn generate_text(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let parts = self.generate(&self.text_model, &body).await?;
        let text = joined_text(&parts);
        if text.is_empty() {
            anyhow::bail!("Gemini returned no text");
        }
        Ok(text)
    }

    /// Text-to-image. The reply may carry a caption next to the image.
    pub async fn generate_image(&self, prompt: &str) -> anyhow::Result<Vec<ResponsePart>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });

        self.generate(&self.image_model, &body).await
    }

    /// Edit an existing image following a natural language instruction.
    pub async fn edit_image(
        &self,
        image: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> anyhow::Result<Vec<ResponsePart>> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "inline_data": { "mime_type": mime_type, "data": BASE64.encode(image) } },
                ]
            }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });

        self.generate(&self.image_model, &body).await
    }

    async fn generate(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<Vec<ResponsePart>> {
        let resp = self
            .client
            .post(format!("{}/{}:generateContent", API_BASE_URL, model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err_body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, err_body);
        }

        let gemini_resp: GeminiResponse = resp.json().await?;
        Ok(into_parts(gemini_resp))
    }
}
