//! Stage worker: `raw` → `parsed`. Decodes the attachment, runs expense
//! OCR, publishes the flattened field list. Failures drop the message;
//! the user can resend the document.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::{Publisher, StageHandler, Subscriber};
use refino_core::{ParsedDocument, RawAttachment};

mod ocr;

use ocr::ExpenseOcr;

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.raw".to_string())
});
static OUTPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("OUTPUT_TOPIC").unwrap_or_else(|_| "refino.parsed".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-extract".to_string())
});

struct ExtractHandler {
    ocr: ExpenseOcr,
    publisher: Publisher,
}

#[async_trait]
impl StageHandler for ExtractHandler {
    type Msg = RawAttachment;

    async fn handle(&self, msg: RawAttachment) -> Result<()> {
        let bytes = BASE64
            .decode(&msg.attachment_data)
            .context("attachment_data is not valid base64")?;

        let fields = self
            .ocr
            .analyze(bytes)
            .await
            .context("expense analysis failed")?;

        tracing::info!(
            source_id = msg.source_id,
            fields = fields.len(),
            "document parsed"
        );

        let parsed = ParsedDocument {
            source_id: msg.source_id,
            attachment_parsed: fields,
            timestamp: msg.timestamp,
        };
        self.publisher
            .publish(&OUTPUT_TOPIC, parsed.source_id, &parsed)
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

    let handler = ExtractHandler {
        ocr: ExpenseOcr::from_env().await,
        publisher: Publisher::connect(&KAFKA_BROKER_URL)?,
    };

    let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
    tracing::info!(topic = %*INPUT_TOPIC, "extractor consuming");
    subscriber.run(&INPUT_TOPIC, &handler).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::BASE64;
    use base64::Engine as _;

    #[test]
    fn attachment_bytes_survive_the_base64_round_trip() {
        let original: Vec<u8> = (0..=255u8).collect();
        let encoded = BASE64.encode(&original);
        assert_eq!(BASE64.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn malformed_base64_is_rejected() {
        assert!(BASE64.decode("not base64!!").is_err());
        assert!(BASE64.decode("aGVsbG8").is_err()); // missing padding
    }
}
