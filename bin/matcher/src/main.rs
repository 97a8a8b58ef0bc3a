use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::{Publisher, Subscriber};
use refino_llm::LlmClient;
use refino_store::{BankStore, CatalogStore, OfferStore, Store};

mod handler;
mod rates;

use handler::MatchHandler;

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.enriched".to_string())
});
pub static OUTPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("OUTPUT_TOPIC").unwrap_or_else(|_| "refino.matched".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-matcher".to_string())
});

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Store::connect_from_env().await?;
    let handler = MatchHandler {
        catalog: CatalogStore::new(store.pool()),
        banks: BankStore::new(store.pool()),
        offers: OfferStore::new(store.pool()),
        llm: LlmClient::from_env()?,
        publisher: Publisher::connect(&KAFKA_BROKER_URL)?,
    };

    let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
    tracing::info!(topic = %*INPUT_TOPIC, "matcher consuming");
    subscriber.run(&INPUT_TOPIC, &handler).await?;
    Ok(())
}
