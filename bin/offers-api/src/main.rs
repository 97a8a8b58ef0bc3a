//! Read API for the dashboard: finalized offers joined with their banks,
//! newest first, plus a health probe over the store.

use anyhow::Result;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_store::{OfferStore, Store};

static PORT: std::sync::LazyLock<String> =
    std::sync::LazyLock::new(|| std::env::var("PORT").unwrap_or_else(|_| "3002".to_string()));

#[derive(Clone)]
struct AppState {
    store: Store,
    offers: OfferStore,
}

async fn list_offers(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.offers.list_joined().await {
        Ok(offers) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "count": offers.len(),
                "offers": offers,
            })),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "offer listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": err.to_string()})),
            )
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let ok = state.store.healthcheck().await;
    Json(json!({
        "ok": ok,
        "database": if ok { "connected" } else { "disconnected" },
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Store::connect_from_env().await?;
    let state = AppState {
        offers: OfferStore::new(store.pool()),
        store,
    };

    let app = Router::new()
        .route("/api/offers", get(list_offers))
        .route("/health", get(health))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let bind_addr = format!("0.0.0.0:{}", &*PORT);
    tracing::info!(addr = %bind_addr, "offers api listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
