//! Stage worker: `parsed` → `interpreted`. A deterministic regex core
//! resolves the loan fields; the LLM may refine company and amount on top.

use anyhow::Result;
use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::{Publisher, StageHandler, Subscriber};
use refino_core::{InterpretedDocument, ParsedDocument};
use refino_llm::LlmClient;

mod assist;
mod heuristics;

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.parsed".to_string())
});
static OUTPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("OUTPUT_TOPIC").unwrap_or_else(|_| "refino.interpreted".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-interpret".to_string())
});

struct InterpretHandler {
    llm: LlmClient,
    publisher: Publisher,
}

#[async_trait]
impl StageHandler for InterpretHandler {
    type Msg = ParsedDocument;

    async fn handle(&self, msg: ParsedDocument) -> Result<()> {
        let fields = &msg.attachment_parsed;

        let mut analysis = heuristics::deterministic_analysis(fields);

        if let Some(refined) = assist::refine(&self.llm, fields).await {
            if refined.company.is_some() {
                analysis.company = refined.company;
            }
            if refined.installment_amount.is_some() {
                analysis.installment_amount = refined.installment_amount;
            }
        }

        tracing::info!(
            source_id = msg.source_id,
            company = analysis.company.as_deref().unwrap_or("-"),
            amount = analysis.installment_amount,
            "document interpreted"
        );

        let interpreted = InterpretedDocument {
            source_id: msg.source_id,
            agent_analysis: analysis,
            timestamp: msg.timestamp,
        };
        self.publisher
            .publish(&OUTPUT_TOPIC, interpreted.source_id, &interpreted)
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

    let handler = InterpretHandler {
        llm: LlmClient::from_env()?,
        publisher: Publisher::connect(&KAFKA_BROKER_URL)?,
    };

    let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
    tracing::info!(topic = %*INPUT_TOPIC, "interpreter consuming");
    subscriber.run(&INPUT_TOPIC, &handler).await?;
    Ok(())
}
