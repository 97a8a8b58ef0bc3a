//! Stage worker: `interpreted` → HTTP trigger + scaffold offer rows. Can be
//! replicated with `WORKER_COUNT`; all replicas share the consumer group.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::Subscriber;
use refino_llm::LlmClient;
use refino_store::{BankStore, OfferStore, Store, UserStore};

mod handler;
mod trigger;

use handler::VerifyHandler;
use trigger::TriggerClient;

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.interpreted".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-verify".to_string())
});
static POST_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("POST_URL").unwrap_or_else(|_| "http://localhost:3000/api/processar".to_string())
});

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let worker_count: usize = std::env::var("WORKER_COUNT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(1)
        .max(1);

    let store = Store::connect_from_env().await?;
    let handler = Arc::new(VerifyHandler {
        users: UserStore::new(store.pool()),
        banks: BankStore::new(store.pool()),
        offers: OfferStore::new(store.pool()),
        trigger: TriggerClient::new(&POST_URL)?,
        llm: LlmClient::from_env()?,
    });

    tracing::info!(workers = worker_count, topic = %*INPUT_TOPIC, "verifier starting");

    let mut tasks = Vec::with_capacity(worker_count);
    for worker in 0..worker_count {
        let handler = Arc::clone(&handler);
        tasks.push(tokio::spawn(async move {
            let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
            tracing::info!(worker, "verifier worker consuming");
            subscriber.run(&INPUT_TOPIC, handler.as_ref()).await
        }));
    }

    for task in tasks {
        task.await??;
    }
    Ok(())
}
