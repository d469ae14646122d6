//! Liveness endpoint for the hosting platform, plus a manual trigger for a
//! channel post.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelPoster, PostError};

#[derive(Clone)]
pub struct WebState {
    pub poster: Option<Arc<ChannelPoster>>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/test", get(test_post))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive" }))
}

async fn test_post(State(state): State<WebState>) -> Response {
    let Some(poster) = state.poster else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": "channel is not configured" })),
        )
            .into_response();
    };

    match poster.publish().await {
        Ok(count) => Json(json!({ "status": "test post sent", "posts_today": count })).into_response(),
        // Daily limit: nothing is sent, the reply keeps the success shape.
        Err(PostError::LimitReached(max)) => {
            tracing::info!("Test post skipped, daily limit of {} reached", max);
            let count = poster.posts_today().await;
            Json(json!({ "status": "test post sent", "posts_today": count })).into_response()
        }
        Err(e) => {
            tracing::error!("Test post failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn serve(port: u16, state: WebState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Health server listening on port {}", port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::ResponsePart;
    use crate::bot::delivery::{DeliveryError, MockMessenger};
    use crate::channel::MockPostContent;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use teloxide::types::{ChatId, Recipient};
    use tower::ServiceExt;

    fn web_state(
        content: MockPostContent,
        messenger: MockMessenger,
        max_daily_posts: u32,
    ) -> WebState {
        WebState {
            poster: Some(Arc::new(ChannelPoster::new(
                Arc::new(content),
                Arc::new(messenger),
                Recipient::Id(ChatId(-100)),
                max_daily_posts,
                15,
            ))),
        }
    }

    async fn get_json(state: WebState, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_alive() {
        let resp = router(WebState { poster: None })
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "status": "alive" }));
    }

    #[tokio::test]
    async fn test_post_without_channel_is_an_error() {
        let resp = router(WebState { poster: None })
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_post_publishes_to_channel() {
        let mut content = MockPostContent::new();
        content
            .expect_generate_text()
            .returning(|_| Ok("AI haqida post".to_string()));
        content.expect_generate_image().returning(|_| {
            Ok(vec![ResponsePart::Image {
                mime_type: "image/png".into(),
                data: b"PNG".to_vec(),
            }])
        });
        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_photo()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let (status, body) = get_json(web_state(content, messenger, 20), "/test").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "test post sent", "posts_today": 1 }));
    }

    #[tokio::test]
    async fn test_post_at_daily_limit_reports_count() {
        let mut content = MockPostContent::new();
        content.expect_generate_text().never();
        content.expect_generate_image().never();

        let (status, body) = get_json(web_state(content, MockMessenger::new(), 0), "/test").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "test post sent", "posts_today": 0 }));
    }

    #[tokio::test]
    async fn test_post_delivery_failure_is_an_error() {
        let mut content = MockPostContent::new();
        content
            .expect_generate_text()
            .returning(|_| Ok("AI haqida post".to_string()));
        content
            .expect_generate_image()
            .returning(|_| Err(anyhow::anyhow!("no image")));
        let mut messenger = MockMessenger::new();
        messenger
            .expect_send_text()
            .returning(|_, _| Err(DeliveryError::Network("timeout".into())));

        let (status, body) = get_json(web_state(content, messenger, 20), "/test").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
    }
}
