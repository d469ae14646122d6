use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::bot::commands::BotCommand;

/// Usage hint for a main-menu button.
pub fn menu_hint(item: &str) -> Option<String> {
    let hint = match item {
        "imagine" => "🎨 Send /imagine followed by a description, e.g.\n/imagine a cat on a rainbow",
        "draw" => "🖼 Send /draw followed by a description, e.g.\n/draw a watercolor lighthouse",
        "edit" => "✏️ Send a photo (optionally with a caption), then /edit <what to change>",
        "ask" => "💬 Just type your question, or use /ask <text>",
        "help" => return Some(BotCommand::descriptions().to_string()),
        _ => return None,
    };
    Some(hint.to_string())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let data = match q.data.as_deref() {
        Some(d) => d,
        None => return Ok(()),
    };

    // ── Main menu ──────────────────────────────────────────────────
    if let Some(item) = data.strip_prefix("menu:") {
        bot.answer_callback_query(&q.id).await?;
        if let (Some(hint), Some(chat_msg)) = (menu_hint(item), q.message.as_ref()) {
            bot.send_message(chat_msg.chat().id, hint).await?;
        }
        return Ok(());
    }

    bot.answer_callback_query(&q.id).await?;
    Ok(())
}
