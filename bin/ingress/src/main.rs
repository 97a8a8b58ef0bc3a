use std::sync::Arc;

use anyhow::Result;
use refino_bus::Publisher;
use refino_chat::ChatGateway;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod actor;
mod fsm;
mod routes;

#[cfg(test)]
mod tests;

use actor::FsmActor;
use routes::{AppState, create_router};

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static RAW_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("OUTPUT_TOPIC").unwrap_or_else(|_| "refino.raw".to_string())
});
static VERIFIED_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("VERIFIED_TOPIC").unwrap_or_else(|_| "refino.verified".to_string())
});
static PORT: std::sync::LazyLock<String> =
    std::sync::LazyLock::new(|| std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()));

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let gateway = Arc::new(ChatGateway::from_env()?);
    let publisher = Publisher::connect(&KAFKA_BROKER_URL)?;

    let fsm = FsmActor::spawn(
        Arc::clone(&gateway),
        publisher,
        RAW_TOPIC.clone(),
        VERIFIED_TOPIC.clone(),
    );

    let app = create_router(AppState { fsm, gateway });

    let bind_addr = format!("0.0.0.0:{}", &*PORT);
    tracing::info!(addr = %bind_addr, "ingress listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
