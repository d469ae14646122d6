use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;

use crate::bot::commands;
use crate::bot::AppState;

/// Handler for plain (non-command) messages: photos become the user's
/// current image, text goes to Gemini.
pub async fn handle_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);

    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        let file = bot.get_file(&photo.file.id).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        tracing::info!("Stored {} byte photo from user {}", buf.len(), user_id);
        state.images.set(user_id, buf, "image/jpeg").await;

        // A caption on the photo is the edit instruction.
        match msg.caption().map(str::trim).filter(|c| !c.is_empty()) {
            Some(caption) => {
                commands::edit(&bot, &state, msg.chat.id, user_id, caption).await?;
            }
            None => {
                bot.send_message(
                    msg.chat.id,
                    "📷 Photo saved. Now send /edit <what to change>.",
                )
                .await?;
            }
        }
        return Ok(());
    }

    if let Some(text) = msg.text() {
        let text = text.trim();
        if text.starts_with('/') {
            bot.send_message(msg.chat.id, "Unknown command. Use /help to see what I can do.")
                .await?;
        } else if !text.is_empty() {
            commands::ask(&bot, &state, msg.chat.id, text).await?;
        }
    }

    Ok(())
}
