//! Stage worker: `composed` → chat delivery. Hands the finished message to
//! the ingress HTTP surface. No retries; a failed delivery is logged and
//! the message is gone.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::{StageHandler, Subscriber};
use refino_core::ComposedOffer;

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.composed".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-notify".to_string())
});
static API_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("API_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string())
        .trim_end_matches('/')
        .to_string()
});

const POST_TIMEOUT: Duration = Duration::from_secs(10);

struct NotifyHandler {
    http: reqwest::Client,
}

#[async_trait]
impl StageHandler for NotifyHandler {
    type Msg = ComposedOffer;

    async fn handle(&self, msg: ComposedOffer) -> Result<()> {
        if msg.source_id <= 0 || msg.offer_message.is_empty() {
            tracing::warn!(
                source_id = msg.source_id,
                "message discarded: missing source_id or offer_message"
            );
            return Ok(());
        }

        let payload = json!({"source_id": msg.source_id, "text": msg.offer_message});
        let response = self
            .http
            .post(format!("{}/api/send_message", &*API_URL))
            .json(&payload)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::info!(source_id = msg.source_id, "offer delivered to chat");
        } else {
            tracing::warn!(
                source_id = msg.source_id,
                status = %response.status(),
                "delivery endpoint answered non-2xx"
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let handler = NotifyHandler {
        http: reqwest::Client::builder().timeout(POST_TIMEOUT).build()?,
    };

    let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
    tracing::info!(topic = %*INPUT_TOPIC, target = %*API_URL, "notifier consuming");
    subscriber.run(&INPUT_TOPIC, &handler).await?;
    Ok(())
}
