//! HTTP surface of the ingress process: the Telegram webhook, the
//! verifier's programmatic trigger, manual message delivery, and health.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use teloxide::types::{Update, UpdateKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use refino_chat::ChatGateway;
use refino_core::{AttachmentType, LoanAnalysis};

use crate::actor::IngressEvent;
use crate::fsm::CLOSURE_TEXT;

#[derive(Clone)]
pub struct AppState {
    pub fsm: mpsc::Sender<IngressEvent>,
    pub gateway: Arc<ChatGateway>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/telegram-webhook", post(telegram_webhook))
        .route("/api/processar", post(trigger_flow))
        .route("/api/send_message", post(send_message))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

/// The chat platform retries on non-200, so this endpoint acknowledges
/// everything; undeliverable updates are logged and forgotten.
async fn telegram_webhook(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    match serde_json::from_value::<Update>(body) {
        Ok(update) => {
            if let Some(event) = event_from_update(update) {
                if state.fsm.send(event).await.is_err() {
                    warn!("conversation actor is gone, dropping update");
                }
            }
        }
        Err(err) => debug!(error = %err, "unparseable webhook update, ignoring"),
    }
    Json(json!({"success": true}))
}

/// Maps a Telegram update onto an ingress event. Photos take the largest
/// rendition (last in the list). Updates without an addressable chat are
/// dropped.
fn event_from_update(update: Update) -> Option<IngressEvent> {
    match update.kind {
        UpdateKind::Message(message) => {
            let chat = message.chat.id.0;

            if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
                return Some(IngressEvent::Attachment {
                    chat,
                    kind: AttachmentType::Image,
                    file_id: photo.file.id.clone(),
                });
            }
            if let Some(document) = message.document() {
                return Some(IngressEvent::Attachment {
                    chat,
                    kind: AttachmentType::Document,
                    file_id: document.file.id.clone(),
                });
            }
            message.text().map(|text| IngressEvent::Text {
                chat,
                text: text.to_string(),
            })
        }
        UpdateKind::CallbackQuery(query) => {
            let data = query.data.clone()?;
            let message = query.message.as_ref().and_then(|m| m.regular_message())?;
            Some(IngressEvent::Callback {
                chat: message.chat.id.0,
                message_id: message.id.0,
                callback_id: query.id.clone(),
                data,
            })
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub source_id: Option<i64>,
    pub agent_analysis: Option<LoanAnalysis>,
    pub trigger_recommendation: Option<bool>,
}

/// Verifier-facing trigger. A positive recommendation starts the financing
/// collection flow in the user's chat; a negative one is a courtesy update.
async fn trigger_flow(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> (StatusCode, Json<Value>) {
    if request.trigger_recommendation == Some(true) {
        let (Some(source_id), Some(analysis)) = (request.source_id, request.agent_analysis) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "erro": "source_id e agent_analysis são obrigatórios quando trigger é true"
                })),
            );
        };

        if state
            .fsm
            .send(IngressEvent::Trigger {
                source_id,
                analysis,
            })
            .await
            .is_err()
        {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"erro": "fluxo de conversa indisponível"})),
            );
        }

        return (
            StatusCode::OK,
            Json(json!({
                "status": "sucesso",
                "mensagem": format!("Fluxo de financiamento iniciado no chat {source_id}."),
            })),
        );
    }

    if let Some(chat) = request.source_id {
        state
            .gateway
            .send_text(chat, &format!("Olá! Uma atualização da API: {CLOSURE_TEXT}"))
            .await;
    }

    (
        StatusCode::OK,
        Json(json!({"status": "sucesso", "mensagem": CLOSURE_TEXT})),
    )
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: Option<i64>,
    pub source_id: Option<i64>,
    pub text: Option<String>,
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> (StatusCode, Json<Value>) {
    let chat = request.chat_id.or(request.source_id);
    let (Some(chat), Some(text)) = (chat, request.text.filter(|t| !t.is_empty())) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"erro": "chat_id e text são obrigatórios"})),
        );
    };

    state.gateway.send_text(chat, &text).await;
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "mensagem": "enviada"})),
    )
}
