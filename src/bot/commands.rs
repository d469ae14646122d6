use std::sync::Arc;
use teloxide::utils::command::BotCommands;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InlineKeyboardButton, InlineKeyboardMarkup};

use crate::ai::gemini::{self, ResponsePart};
use crate::ai::queue::GenerationRequest;
use crate::bot::delivery::{self, Photo, MAX_MESSAGE_CHARS};
use crate::bot::{job_error_message, AppState};
use crate::channel::{schedule, PostError};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum BotCommand {
    #[command(description = "Start / restart the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Generate an image with Stable Diffusion: /imagine <prompt>")]
    Imagine(String),
    #[command(description = "Generate an image with Gemini: /draw <prompt>")]
    Draw(String),
    #[command(description = "Ask Gemini a question: /ask <text>")]
    Ask(String),
    #[command(description = "Edit your last photo: /edit <instruction>")]
    Edit(String),
    #[command(description = "Forget your last photo")]
    Reset,
    #[command(description = "Publish a channel post now (admins)")]
    Post,
    #[command(description = "Channel posting stats (admins)")]
    Stats,
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🎨 Imagine", "menu:imagine"),
            InlineKeyboardButton::callback("🖼 Draw", "menu:draw"),
        ],
        vec![
            InlineKeyboardButton::callback("✏️ Edit a photo", "menu:edit"),
            InlineKeyboardButton::callback("💬 Ask", "menu:ask"),
        ],
        vec![InlineKeyboardButton::callback("❓ Help", "menu:help")],
    ])
}

/// The user's instruction, or the configured default when they gave none.
pub fn edit_instruction(arg: &str, fallback: &str) -> String {
    let arg = arg.trim();
    if arg.is_empty() {
        fallback.to_string()
    } else {
        arg.to_string()
    }
}

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);
    let chat_id = msg.chat.id;

    match cmd {
        BotCommand::Start => {
            bot.send_message(
                chat_id,
                "👋 Hi! I create images and texts with AI.\n\n\
                 🎨 /imagine <prompt> — Stable Diffusion\n\
                 🖼 /draw <prompt> — Gemini image\n\
                 ✏️ Send a photo, then /edit <instruction>\n\
                 💬 /ask <question> — Gemini text",
            )
            .reply_markup(main_menu())
            .await?;
        }

        BotCommand::Help => {
            bot.send_message(chat_id, BotCommand::descriptions().to_string())
                .await?;
        }

        BotCommand::Imagine(prompt) => imagine(&bot, &state, chat_id, &prompt).await?,

        BotCommand::Draw(prompt) => {
            let prompt = prompt.trim();
            if prompt.is_empty() {
                bot.send_message(chat_id, "Usage: /draw <prompt>").await?;
                return Ok(());
            }
            bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await?;
            match state.gemini.generate_image(prompt).await {
                Ok(parts) => send_gemini_image(&bot, &state, chat_id, user_id, &parts, prompt).await?,
                Err(e) => {
                    tracing::error!("Gemini image generation failed for user {}: {}", user_id, e);
                    bot.send_message(chat_id, "❌ Could not generate an image. Please try again.")
                        .await?;
                }
            }
        }

        BotCommand::Ask(question) => {
            let question = question.trim();
            if question.is_empty() {
                bot.send_message(chat_id, "Usage: /ask <text>").await?;
                return Ok(());
            }
            ask(&bot, &state, chat_id, question).await?;
        }

        BotCommand::Edit(arg) => edit(&bot, &state, chat_id, user_id, &arg).await?,

        BotCommand::Reset => {
            let text = if state.images.clear(user_id).await {
                "🗑 Your last photo was forgotten."
            } else {
                "There is no photo to forget."
            };
            bot.send_message(chat_id, text).await?;
        }

        BotCommand::Post => {
            if !state.config.is_admin(user_id) {
                bot.send_message(chat_id, "❌ Only admins can publish posts.").await?;
                return Ok(());
            }
            let Some(poster) = state.poster.as_ref() else {
                bot.send_message(chat_id, "Channel is not configured.").await?;
                return Ok(());
            };
            bot.send_message(chat_id, "⏳ Generating a post...").await?;
            let reply = match poster.publish().await {
                Ok(count) => format!("✅ Post {}/{} sent.", count, poster.daily_limit().await),
                Err(PostError::LimitReached(max)) => {
                    format!("ℹ️ Daily limit of {} posts already reached.", max)
                }
                Err(e) => {
                    tracing::error!("Manual post failed: {}", e);
                    format!("❌ Post failed: {}", e)
                }
            };
            bot.send_message(chat_id, reply).await?;
        }

        BotCommand::Stats => {
            if !state.config.is_admin(user_id) {
                bot.send_message(chat_id, "❌ Only admins can see stats.").await?;
                return Ok(());
            }
            let Some(poster) = state.poster.as_ref() else {
                bot.send_message(chat_id, "Channel is not configured.").await?;
                return Ok(());
            };
            let slots = schedule::posting_slots(
                state.config.post_start_hour,
                state.config.post_end_hour,
                state.config.post_interval_minutes,
            );
            let next = schedule::next_slot(chrono::Utc::now(), &slots)
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "none".to_string());
            bot.send_message(
                chat_id,
                format!(
                    "📊 Posts today: {}/{}\n⏰ Next post: {}",
                    poster.posts_today().await,
                    poster.daily_limit().await,
                    next
                ),
            )
            .await?;
        }
    }

    Ok(())
}

/// Stable Diffusion through the Fal queue.
async fn imagine(bot: &Bot, state: &AppState, chat_id: ChatId, prompt: &str) -> anyhow::Result<()> {
    let request = match GenerationRequest::new(prompt) {
        Ok(request) => request,
        Err(_) => {
            bot.send_message(chat_id, "Usage: /imagine <prompt>").await?;
            return Ok(());
        }
    };

    let progress = bot.send_message(chat_id, "🎨 Generating your image...").await?;
    bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await?;

    let cancel = state.shutdown.child_token();
    let result = state
        .poller
        .submit_and_await_cancellable(
            &request,
            state.config.fal_max_attempts,
            state.config.fal_poll_interval,
            state.config.fal_overall_timeout,
            &cancel,
        )
        .await;

    if let Err(e) = bot.delete_message(chat_id, progress.id).await {
        tracing::debug!("Could not delete progress message: {}", e);
    }

    match result {
        Ok(result) => {
            tracing::debug!("Generation metadata: {:?}", result.metadata);
            for url in result.urls() {
                delivery::deliver_photo(
                    state.messenger.as_ref(),
                    chat_id.into(),
                    Photo::Url(url.to_string()),
                    request.prompt(),
                    state.config.max_caption_lines,
                )
                .await?;
            }
        }
        Err(e) => {
            tracing::warn!(
                retryable = e.is_retryable(),
                "Image generation failed for prompt '{}': {}",
                request.prompt(),
                e
            );
            bot.send_message(chat_id, job_error_message(&e)).await?;
        }
    }

    Ok(())
}

pub(crate) async fn ask(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    question: &str,
) -> anyhow::Result<()> {
    bot.send_chat_action(chat_id, ChatAction::Typing).await?;
    let reply = match state.gemini.generate_text(question).await {
        Ok(text) => delivery::fit_text(&text, usize::MAX, MAX_MESSAGE_CHARS),
        Err(e) => {
            tracing::error!("Gemini text generation failed: {}", e);
            "❌ Could not get an answer right now. Please try again.".to_string()
        }
    };
    bot.send_message(chat_id, reply).await?;
    Ok(())
}

/// Edit the user's current photo with Gemini.
pub(crate) async fn edit(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
    arg: &str,
) -> anyhow::Result<()> {
    let Some(image) = state.images.get(user_id).await else {
        bot.send_message(chat_id, "📷 Send me a photo first, then use /edit <what to change>.")
            .await?;
        return Ok(());
    };

    let instruction = edit_instruction(arg, &state.config.fallback_edit_instruction);
    tracing::info!("Editing image for user {}: {}", user_id, instruction);
    bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await?;

    match state
        .gemini
        .edit_image(&image.data, &image.mime_type, &instruction)
        .await
    {
        Ok(parts) => send_gemini_image(bot, state, chat_id, user_id, &parts, &instruction).await,
        Err(e) => {
            tracing::error!("Gemini edit failed for user {}: {}", user_id, e);
            bot.send_message(chat_id, "❌ Could not edit the image. Please try again.")
                .await?;
            Ok(())
        }
    }
}

/// Deliver a Gemini image reply and remember the image for further edits.
async fn send_gemini_image(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
    parts: &[ResponsePart],
    fallback_caption: &str,
) -> anyhow::Result<()> {
    let text = gemini::joined_text(parts);

    let Some((mime_type, image)) = gemini::first_image(parts) else {
        let reply = if text.is_empty() {
            "🤷 No image came back. Try a different prompt.".to_string()
        } else {
            delivery::fit_text(&text, usize::MAX, MAX_MESSAGE_CHARS)
        };
        bot.send_message(chat_id, reply).await?;
        return Ok(());
    };

    let image = image.to_vec();
    state.images.set(user_id, image.clone(), mime_type).await;

    let caption = if text.is_empty() { fallback_caption } else { &text };
    delivery::deliver_photo(
        state.messenger.as_ref(),
        chat_id.into(),
        Photo::Bytes {
            data: image,
            mime_type: mime_type.to_string(),
        },
        caption,
        state.config.max_caption_lines,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_edit_uses_fallback() {
        assert_eq!(edit_instruction("   ", "make it vivid"), "make it vivid");
        assert_eq!(edit_instruction(" add a hat ", "make it vivid"), "add a hat");
    }

    #[test]
    fn commands_parse_their_arguments() {
        let cmd = BotCommand::parse("/imagine a cat on a rainbow", "bot").unwrap();
        assert!(matches!(cmd, BotCommand::Imagine(p) if p == "a cat on a rainbow"));

        let cmd = BotCommand::parse("/edit", "bot").unwrap();
        assert!(matches!(cmd, BotCommand::Edit(p) if p.is_empty()));
    }
}
