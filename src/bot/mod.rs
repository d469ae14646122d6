pub mod callbacks;
pub mod commands;
pub mod delivery;
pub mod handlers;
pub mod image_context;

use std::sync::Arc;
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::dptree;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::ai::gemini::GeminiClient;
use crate::ai::poller::{JobError, JobPoller};
use crate::channel::ChannelPoster;
use crate::config::AppConfig;
use delivery::Messenger;
use image_context::ImageContextStore;

type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared application state, accessible from all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub gemini: Arc<GeminiClient>,
    pub poller: JobPoller,
    pub messenger: Arc<dyn Messenger>,
    /// Last photo each user sent or received, for /edit
    pub images: ImageContextStore,
    /// Present only when a channel is configured
    pub poster: Option<Arc<ChannelPoster>>,
    /// Fires on shutdown; in-flight generations stop waiting
    pub shutdown: CancellationToken,
}

/// Build the teloxide update handler tree.
pub fn build_handler() -> UpdateHandler<HandlerError> {
    let command_handler = Update::filter_message()
        .filter_command::<commands::BotCommand>()
        .endpoint(commands::handle_command);

    let callback_handler = Update::filter_callback_query()
        .endpoint(callbacks::handle_callback);

    let message_handler = Update::filter_message()
        .endpoint(handlers::handle_message);

    dptree::entry()
        .branch(command_handler)
        .branch(callback_handler)
        .branch(message_handler)
}

/// User-facing text for a failed image generation.
pub fn job_error_message(err: &JobError) -> &'static str {
    match err {
        JobError::PollTimeout { .. } => {
            "⌛ The image is taking too long. Please try again in a few minutes."
        }
        JobError::JobFailed { .. } => "❌ The image service could not generate this picture.",
        JobError::RequestRejected { status_code, .. } if *status_code == 422 || *status_code == 400 => {
            "🚫 The image service rejected this prompt. Try rephrasing it."
        }
        JobError::RequestRejected { .. } | JobError::Transport(_) => {
            "⚠️ The image service is unavailable right now. Please try again later."
        }
        JobError::Protocol(_) | JobError::ResultFetch(_) => {
            "⚠️ Something went wrong while fetching your image."
        }
        JobError::Aborted => "🛑 Generation cancelled.",
    }
}
