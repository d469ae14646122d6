use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub google_api_key: String,
    pub fal_key: String,

    /// Channel for scheduled posts. Scheduling is off when unset.
    pub channel_id: Option<String>,

    /// Comma-separated Telegram user IDs of admins
    pub admin_ids: Vec<i64>,

    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub fal_model: String,

    /// Status checks per Fal job before giving up
    pub fal_max_attempts: u32,
    pub fal_poll_interval: Duration,
    pub fal_overall_timeout: Duration,
    /// Timeout for every individual HTTP call
    pub http_timeout: Duration,

    /// Posting window in UTC hours, `[start, end)`
    pub post_start_hour: u32,
    pub post_end_hour: u32,
    pub post_interval_minutes: u32,
    pub max_daily_posts: u32,

    pub max_caption_lines: usize,
    /// Used by /edit when the user gives no instruction
    pub fallback_edit_instruction: String,

    pub port: u16,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let admin_ids = parse_admin_ids(&std::env::var("ADMIN_IDS").unwrap_or_default());

        let config = Self {
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")?,
            google_api_key: std::env::var("GOOGLE_API_KEY")?,
            fal_key: std::env::var("FAL_KEY")?,
            channel_id: std::env::var("TELEGRAM_CHANNEL_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            admin_ids,
            gemini_text_model: env_string("GEMINI_TEXT_MODEL", "gemini-1.5-flash"),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image-preview"),
            fal_model: env_string("FAL_MODEL", "fal-ai/fast-sdxl"),
            fal_max_attempts: env_or("FAL_MAX_ATTEMPTS", 60u32).max(1),
            fal_poll_interval: Duration::from_secs(env_or("FAL_POLL_INTERVAL_SECS", 2u64).max(1)),
            fal_overall_timeout: Duration::from_secs(env_or("FAL_OVERALL_TIMEOUT_SECS", 180)),
            http_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30)),
            post_start_hour: env_or("POST_START_HOUR", 7),
            post_end_hour: env_or("POST_END_HOUR", 21),
            post_interval_minutes: env_or("POST_INTERVAL_MINUTES", 42u32).max(1),
            max_daily_posts: env_or("MAX_DAILY_POSTS", 20),
            max_caption_lines: env_or("MAX_CAPTION_LINES", 15),
            fallback_edit_instruction: env_string(
                "FALLBACK_EDIT_INSTRUCTION",
                "Make this image more vivid and detailed",
            ),
            port: env_or("PORT", 5000),
        };

        if config.post_start_hour >= config.post_end_hour || config.post_end_hour > 24 {
            anyhow::bail!(
                "Invalid posting window {}..{} (hours must satisfy start < end <= 24)",
                config.post_start_hour,
                config.post_end_hour
            );
        }

        Ok(config)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_ids_ignore_garbage() {
        assert_eq!(parse_admin_ids("1, 2,x,,  3 "), vec![1, 2, 3]);
        assert!(parse_admin_ids("").is_empty());
    }
}
