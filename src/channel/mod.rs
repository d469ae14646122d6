pub mod schedule;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::IndexedRandom;
use teloxide::types::Recipient;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ai::gemini::{self, GeminiClient, ResponsePart};
use crate::bot::delivery::{self, Delivered, Messenger, Photo, MAX_MESSAGE_CHARS};
use schedule::DailyCounter;

pub const POST_TOPICS: &[&str] = &[
    "Sun'iy intellekt va kelajak texnologiyalar",
    "Raqamli san'at va AI yaratuvchiligi",
    "Mashinali o'qitish va neural tarmoqlar",
    "AI ning kundalik hayotdagi roli",
    "Robotlar va avtomatlashtirish",
    "Big Data va ma'lumotlar tahlili",
    "Kiber xavfsizlik va AI himoyasi",
    "Virtual reallik va AI integratsiyasi",
    "AI yordamida biznes rivojlantirish",
    "Tibbiyotda sun'iy intellekt",
    "Ta'limda AI texnologiyalari",
    "Smart shaharlar va IoT",
    "AI va ijodkorlik",
    "Avtonom transport vositalari",
    "AI etikasi va axloqiy masalalar",
    "Chatbot va virtual assistentlar",
    "Computer vision va tasvirni tanish",
    "Natural language processing",
    "AI startaplar va innovatsiyalar",
    "Kelajakdagi AI tendensiyalar",
];

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("daily limit of {0} posts reached")]
    LimitReached(u32),
    #[error(transparent)]
    Delivery(#[from] delivery::DeliveryError),
}

fn text_prompt(topic: &str) -> String {
    format!(
        "{topic} mavzusida qiziq va ma'lumotli post yoz. Post o'zbek tilida bo'lishi kerak.\n\n\
         Quyidagi formatda yoz:\n\
         - 2-3 ta qiziq faktlar\n\
         - Amaliy maslahatlar\n\
         - Kelajak istiqbollari\n\
         - Hashtag'lar qo'sh\n\n\
         Post 200-300 so'zdan iborat bo'lsin."
    )
}

fn image_prompt(topic: &str) -> String {
    format!(
        "High-quality digital art about {topic}, futuristic technology, AI concepts, \
         modern design, vibrant colors"
    )
}

/// Caption used when text generation fails.
pub fn fallback_text(topic: &str) -> String {
    format!(
        "🤖 {topic}\n\nSun'iy intellekt sohasidagi eng so'nggi yangiliklarni kuzatib boring!\n\n\
         #AI #SuniyIntellekt #Texnologiya"
    )
}

/// Where post text and artwork come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostContent: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> anyhow::Result<String>;

    async fn generate_image(&self, prompt: &str) -> anyhow::Result<Vec<ResponsePart>>;
}

#[async_trait]
impl PostContent for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> anyhow::Result<String> {
        GeminiClient::generate_text(self, prompt).await
    }

    async fn generate_image(&self, prompt: &str) -> anyhow::Result<Vec<ResponsePart>> {
        GeminiClient::generate_image(self, prompt).await
    }
}

/// Generates and publishes posts to one channel, within a daily budget.
pub struct ChannelPoster {
    content: Arc<dyn PostContent>,
    messenger: Arc<dyn Messenger>,
    channel: Recipient,
    max_caption_lines: usize,
    counter: Mutex<DailyCounter>,
}

impl ChannelPoster {
    pub fn new(
        content: Arc<dyn PostContent>,
        messenger: Arc<dyn Messenger>,
        channel: Recipient,
        max_daily_posts: u32,
        max_caption_lines: usize,
    ) -> Self {
        Self {
            content,
            messenger,
            channel,
            max_caption_lines,
            counter: Mutex::new(DailyCounter::new(max_daily_posts, Utc::now().date_naive())),
        }
    }

    pub async fn posts_today(&self) -> u32 {
        self.counter.lock().await.count(Utc::now().date_naive())
    }

    pub async fn daily_limit(&self) -> u32 {
        self.counter.lock().await.max()
    }

    /// Generate one post on a random topic and send it. Returns today's post
    /// count after sending.
    pub async fn publish(&self) -> Result<u32, PostError> {
        let today = Utc::now().date_naive();
        let reserved = {
            let mut counter = self.counter.lock().await;
            counter.try_reserve(today).ok_or(PostError::LimitReached(counter.max()))?
        };

        match self.generate_and_send().await {
            Ok(()) => {
                tracing::info!("Post {} sent to channel", reserved);
                Ok(reserved)
            }
            Err(e) => {
                self.counter.lock().await.release(today);
                Err(e)
            }
        }
    }

    async fn generate_and_send(&self) -> Result<(), PostError> {
        let topic = POST_TOPICS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(POST_TOPICS[0]);
        tracing::info!("Generating post for topic: {}", topic);

        let text = match self.content.generate_text(&text_prompt(topic)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Error generating text content: {}", e);
                fallback_text(topic)
            }
        };

        let image = match self.content.generate_image(&image_prompt(topic)).await {
            Ok(parts) => gemini::first_image(&parts)
                .map(|(mime_type, data)| (mime_type.to_string(), data.to_vec())),
            Err(e) => {
                tracing::error!("Error generating image with Gemini: {}", e);
                None
            }
        };

        match image {
            Some((mime_type, data)) => {
                let delivered = delivery::deliver_photo(
                    self.messenger.as_ref(),
                    self.channel.clone(),
                    Photo::Bytes { data, mime_type },
                    &text,
                    self.max_caption_lines,
                )
                .await?;
                if delivered == Delivered::TextOnly {
                    tracing::warn!("Channel post went out without its image");
                }
            }
            None => {
                tracing::info!("No image available, posting text only");
                self.messenger
                    .send_text(
                        self.channel.clone(),
                        delivery::fit_text(&text, usize::MAX, MAX_MESSAGE_CHARS),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Post at every slot until `cancel` fires.
    pub async fn run(self: Arc<Self>, slots: Vec<chrono::NaiveTime>, cancel: CancellationToken) {
        tracing::info!("Scheduled {} daily posts (UTC): {:?}", slots.len(), slots);

        loop {
            let Some(next) = schedule::next_slot(Utc::now(), &slots) else {
                tracing::warn!("No posting slots configured; scheduler stopped");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tracing::debug!("Next post at {} (in {:?})", next, wait);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.publish().await {
                Ok(count) => tracing::info!("Scheduled post done ({}/{})", count, self.daily_limit().await),
                Err(PostError::LimitReached(max)) => {
                    tracing::info!("Daily limit reached ({} posts)", max)
                }
                Err(e) => tracing::error!("Scheduled post failed: {}", e),
            }
        }
    }
}

/// Parse `TELEGRAM_CHANNEL_ID`: numeric chat id or `@username`.
pub fn parse_channel(raw: &str) -> Recipient {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
        Err(_) if raw.starts_with('@') => Recipient::ChannelUsername(raw.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{raw}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::delivery::{DeliveryError, MockMessenger};
    use teloxide::types::ChatId;

    fn poster(
        content: MockPostContent,
        messenger: MockMessenger,
        max_daily_posts: u32,
    ) -> ChannelPoster {
        ChannelPoster::new(
            Arc::new(content),
            Arc::new(messenger),
            Recipient::Id(ChatId(-100)),
            max_daily_posts,
            15,
        )
    }

    fn artwork() -> Vec<ResponsePart> {
        vec![ResponsePart::Image {
            mime_type: "image/jpeg".into(),
            data: b"JPEG".to_vec(),
        }]
    }

    #[tokio::test]
    async fn failed_text_falls_back_to_template_caption() {
        let mut content = MockPostContent::new();
        content
            .expect_generate_text()
            .returning(|_| Err(anyhow::anyhow!("quota exceeded")));
        content.expect_generate_image().returning(|_| Ok(artwork()));

        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_photo()
            .withf(|_, data, mime, caption| {
                data == b"JPEG"
                    && mime == "image/jpeg"
                    && caption.as_deref().is_some_and(|c| c.contains("#AI"))
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        messenger.expect_send_text().never();

        let poster = poster(content, messenger, 20);
        assert_eq!(poster.publish().await.unwrap(), 1);
        assert_eq!(poster.posts_today().await, 1);
    }

    #[tokio::test]
    async fn post_without_image_goes_out_as_text() {
        let mut content = MockPostContent::new();
        content
            .expect_generate_text()
            .returning(|_| Ok("AI haqida post".to_string()));
        content
            .expect_generate_image()
            .returning(|_| Ok(vec![ResponsePart::Text("no picture today".into())]));

        let mut messenger = MockMessenger::new();
        messenger.expect_send_photo().never();
        messenger
            .expect_send_text()
            .withf(|to, text| *to == Recipient::Id(ChatId(-100)) && text == "AI haqida post")
            .times(1)
            .returning(|_, _| Ok(()));

        let poster = poster(content, messenger, 20);
        assert_eq!(poster.publish().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_send_does_not_use_up_the_daily_budget() {
        let mut content = MockPostContent::new();
        content
            .expect_generate_text()
            .returning(|_| Ok("AI haqida post".to_string()));
        content
            .expect_generate_image()
            .returning(|_| Err(anyhow::anyhow!("image model overloaded")));

        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .times(1)
            .returning(|_, _| Err(DeliveryError::Network("connection reset".into())));

        let poster = poster(content, messenger, 20);
        let err = poster.publish().await.unwrap_err();
        assert!(matches!(err, PostError::Delivery(DeliveryError::Network(_))));
        assert_eq!(poster.posts_today().await, 0);
    }

    #[tokio::test]
    async fn publish_stops_at_daily_limit() {
        let mut content = MockPostContent::new();
        content.expect_generate_text().never();
        content.expect_generate_image().never();

        let poster = poster(content, MockMessenger::new(), 0);
        let err = poster.publish().await.unwrap_err();
        assert!(matches!(err, PostError::LimitReached(0)));
    }

    #[test]
    fn parses_numeric_and_username_channels() {
        assert_eq!(parse_channel("-1001234"), Recipient::Id(ChatId(-1001234)));
        assert_eq!(
            parse_channel("@ai_posts"),
            Recipient::ChannelUsername("@ai_posts".into())
        );
        assert_eq!(
            parse_channel("ai_posts"),
            Recipient::ChannelUsername("@ai_posts".into())
        );
    }

    #[test]
    fn prompts_mention_topic() {
        let topic = POST_TOPICS[3];
        assert!(text_prompt(topic).starts_with(topic));
        assert!(image_prompt(topic).contains(topic));
        assert!(fallback_text(topic).contains("#AI"));
    }
}
