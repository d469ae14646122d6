//! Outbound messaging with a single typed error.
//!
//! Senders report what went wrong through [`DeliveryError`]; the fallback
//! policy (photo, then plain text) lives in [`deliver_photo`] instead of being
//! repeated around every send call.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, Recipient};
use teloxide::RequestError;

/// Telegram's hard limits.
pub const MAX_CAPTION_CHARS: usize = 1024;
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Telegram refused this particular message (bad caption, unsupported
    /// photo, chat not found). Another shape of message may still go through.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// Telegram could not be reached or asked us to back off.
    #[error("network error: {0}")]
    Network(String),
}

impl From<RequestError> for DeliveryError {
    fn from(err: RequestError) -> Self {
        let text = err.to_string();
        match err {
            RequestError::Api(_) => Self::Rejected(text),
            RequestError::Network(_) | RequestError::RetryAfter(_) => Self::Network(text),
            _ => Self::Rejected(text),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, to: Recipient, text: String) -> Result<(), DeliveryError>;

    async fn send_photo(
        &self,
        to: Recipient,
        image: Vec<u8>,
        mime_type: String,
        caption: Option<String>,
    ) -> Result<(), DeliveryError>;

    async fn send_photo_url(
        &self,
        to: Recipient,
        url: String,
        caption: Option<String>,
    ) -> Result<(), DeliveryError>;
}

pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, to: Recipient, text: String) -> Result<(), DeliveryError> {
        self.bot.send_message(to, text).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        to: Recipient,
        image: Vec<u8>,
        mime_type: String,
        caption: Option<String>,
    ) -> Result<(), DeliveryError> {
        let photo = InputFile::memory(image).file_name(upload_name(&mime_type));
        let mut req = self.bot.send_photo(to, photo);
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        req.await?;
        Ok(())
    }

    async fn send_photo_url(
        &self,
        to: Recipient,
        url: String,
        caption: Option<String>,
    ) -> Result<(), DeliveryError> {
        let url = reqwest::Url::parse(&url)
            .map_err(|e| DeliveryError::Rejected(format!("invalid image URL '{}': {}", url, e)))?;
        let mut req = self.bot.send_photo(to, InputFile::url(url));
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        req.await?;
        Ok(())
    }
}

/// Keep at most `max_lines` lines and `max_chars` characters, marking the
/// cut with an ellipsis.
pub fn fit_text(text: &str, max_lines: usize, max_chars: usize) -> String {
    let text = text.trim();
    let lines: Vec<&str> = text.lines().collect();
    let mut out = lines
        .iter()
        .take(max_lines.max(1))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let mut cut = lines.len() > max_lines.max(1);

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars.saturating_sub(1)).collect();
        cut = true;
    }
    if cut {
        if out.chars().count() >= max_chars {
            out = out.chars().take(max_chars.saturating_sub(1)).collect();
        }
        out = out.trim_end().to_string();
        out.push('…');
    }
    out
}

/// File name for an in-memory upload. Telegram sniffs the type from the
/// extension.
pub fn upload_name(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "image.jpg",
        "image/webp" => "image.webp",
        "image/gif" => "image.gif",
        _ => "image.png",
    }
}

pub enum Photo {
    Bytes { data: Vec<u8>, mime_type: String },
    Url(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Delivered {
    Photo,
    TextOnly,
}

/// Send a photo with a caption; if Telegram rejects the photo message, fall
/// back to the caption as plain text (with the link, for URL photos).
/// Network errors are returned as-is.
pub async fn deliver_photo(
    messenger: &dyn Messenger,
    to: Recipient,
    photo: Photo,
    caption: &str,
    max_caption_lines: usize,
) -> Result<Delivered, DeliveryError> {
    let fitted = fit_text(caption, max_caption_lines, MAX_CAPTION_CHARS);
    let fitted = (!fitted.is_empty()).then_some(fitted);

    let (sent, link) = match photo {
        Photo::Bytes { data, mime_type } => (
            messenger
                .send_photo(to.clone(), data, mime_type, fitted)
                .await,
            None,
        ),
        Photo::Url(url) => (
            messenger
                .send_photo_url(to.clone(), url.clone(), fitted)
                .await,
            Some(url),
        ),
    };

    match sent {
        Ok(()) => Ok(Delivered::Photo),
        Err(DeliveryError::Rejected(reason)) => {
            tracing::warn!("Photo rejected, falling back to text: {}", reason);
            let mut text = caption.trim().to_string();
            if let Some(link) = link {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&link);
            }
            if text.is_empty() {
                return Err(DeliveryError::Rejected(reason));
            }
            messenger
                .send_text(to, fit_text(&text, usize::MAX, MAX_MESSAGE_CHARS))
                .await?;
            Ok(Delivered::TextOnly)
        }
        Err(e) => Err(e),
    }
}
