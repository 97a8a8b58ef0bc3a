//! Stage worker: `matched` → `composed`. Asks the model for a short
//! user-facing message; a deterministic fallback guarantees something is
//! always published, within the length bound.

use anyhow::Result;
use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::{Publisher, StageHandler, Subscriber};
use refino_core::{ComposedOffer, MatchedLoan, now_ms};
use refino_llm::LlmClient;

mod templates;

use templates::{SYSTEM_PROMPT, build_prompt, resolve_message};

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.matched".to_string())
});
static OUTPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("OUTPUT_TOPIC").unwrap_or_else(|_| "refino.composed".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-compose".to_string())
});

struct ComposeHandler {
    llm: LlmClient,
    publisher: Publisher,
}

#[async_trait]
impl StageHandler for ComposeHandler {
    type Msg = MatchedLoan;

    async fn handle(&self, msg: MatchedLoan) -> Result<()> {
        let prompt = build_prompt(&msg);
        let llm_text = match self.llm.generate(&prompt, Some(SYSTEM_PROMPT)).await {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(source_id = msg.source_id, error = %err, "llm compose failed, using fallback");
                None
            }
        };

        let offer_message = resolve_message(llm_text, &msg);
        tracing::info!(
            source_id = msg.source_id,
            chars = offer_message.chars().count(),
            "offer message composed"
        );

        let composed = ComposedOffer {
            source_id: msg.source_id,
            offer_message,
            timestamp: now_ms(),
        };
        self.publisher
            .publish(&OUTPUT_TOPIC, composed.source_id, &composed)
            .await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let handler = ComposeHandler {
        llm: LlmClient::from_env()?,
        publisher: Publisher::connect(&KAFKA_BROKER_URL)?,
    };

    let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
    tracing::info!(topic = %*INPUT_TOPIC, "composer consuming");
    subscriber.run(&INPUT_TOPIC, &handler).await?;
    Ok(())
}
