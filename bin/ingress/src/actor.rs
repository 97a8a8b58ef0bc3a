//! The single owner of all conversation state. Every ingress event, webhook
//! update or verifier trigger alike, is funneled through one mpsc channel into
//! this task, which serializes handling per chat by construction and is the
//! only mutator of the state map and the callback-dedup sets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use refino_bus::Publisher;
use refino_chat::ChatGateway;
use refino_core::{
    AttachmentType, FinancingInfo, FinancingType, LoanAnalysis, RawAttachment, VerifiedLoan,
    now_ms,
};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::fsm::{
    self, Action, Conversation, Event, FILE_FAILED_TEXT, FILE_RECEIVED_TEXT, INTERNAL_ERROR_TEXT,
    KeyboardKind,
};

#[derive(Debug)]
pub enum IngressEvent {
    Text {
        chat: i64,
        text: String,
    },
    Attachment {
        chat: i64,
        kind: AttachmentType,
        file_id: String,
    },
    Callback {
        chat: i64,
        message_id: i32,
        callback_id: String,
        data: String,
    },
    Trigger {
        source_id: i64,
        analysis: LoanAnalysis,
    },
}

/// Idempotent button taps: a callback id is handled at most once, and a chat
/// with a tap in flight drops further taps until it finishes.
#[derive(Default)]
pub struct CallbackDebouncer {
    processed: HashSet<String>,
    in_flight: HashSet<i64>,
}

impl CallbackDebouncer {
    /// Claims the callback. `false` means ack-and-drop.
    pub fn try_begin(&mut self, callback_id: &str, chat: i64) -> bool {
        if self.processed.contains(callback_id) || self.in_flight.contains(&chat) {
            return false;
        }
        self.processed.insert(callback_id.to_string());
        self.in_flight.insert(chat);
        true
    }

    pub fn finish(&mut self, chat: i64) {
        self.in_flight.remove(&chat);
    }
}

pub struct FsmActor {
    gateway: Arc<ChatGateway>,
    publisher: Publisher,
    raw_topic: String,
    verified_topic: String,
    conversations: HashMap<i64, Conversation>,
    debouncer: CallbackDebouncer,
}

impl FsmActor {
    pub fn spawn(
        gateway: Arc<ChatGateway>,
        publisher: Publisher,
        raw_topic: String,
        verified_topic: String,
    ) -> mpsc::Sender<IngressEvent> {
        let (tx, rx) = mpsc::channel(64);
        let actor = Self {
            gateway,
            publisher,
            raw_topic,
            verified_topic,
            conversations: HashMap::new(),
            debouncer: CallbackDebouncer::default(),
        };
        tokio::spawn(actor.run(rx));
        tx
    }

    async fn run(mut self, mut rx: mpsc::Receiver<IngressEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch(event).await;
        }
    }

    async fn dispatch(&mut self, event: IngressEvent) {
        match event {
            IngressEvent::Text { chat, text } => {
                self.step(chat, Event::Text { text }).await;
            }
            IngressEvent::Attachment {
                chat,
                kind,
                file_id,
            } => {
                self.step(chat, Event::Attachment { kind, file_id }).await;
            }
            IngressEvent::Trigger {
                source_id,
                analysis,
            } => {
                info!(source_id, "verifier trigger, starting collection flow");
                self.step(source_id, Event::VerifierTrigger { analysis })
                    .await;
            }
            IngressEvent::Callback {
                chat,
                message_id,
                callback_id,
                data,
            } => {
                if !self.debouncer.try_begin(&callback_id, chat) {
                    self.gateway.ack_callback(&callback_id).await;
                    return;
                }

                // First tap wins: strip the keyboard before doing anything
                // slower, so a double tap has nothing left to press.
                self.gateway.clear_buttons_immediately(chat, message_id).await;
                self.step(chat, Event::Callback { message_id, data }).await;

                self.debouncer.finish(chat);
                self.gateway.ack_callback(&callback_id).await;
            }
        }
    }

    async fn step(&mut self, chat: i64, event: Event) {
        let current = self.conversations.get(&chat).cloned().unwrap_or_default();
        let (next, actions) = fsm::transition(&current, event);

        if next.state == fsm::ConvState::Idle && next.pending_analysis.is_none() {
            self.conversations.remove(&chat);
        } else {
            self.conversations.insert(chat, next);
        }

        for action in actions {
            self.execute(chat, action).await;
        }
    }

    async fn execute(&self, chat: i64, action: Action) {
        match action {
            Action::SendText(text) => self.gateway.send_text(chat, &text).await,
            Action::SendKeyboard { text, keyboard } => {
                self.gateway
                    .send_text_with_buttons(chat, &text, keyboard_markup(keyboard))
                    .await
            }
            Action::EditAndClear { message_id, text } => {
                self.gateway
                    .edit_text_and_clear_buttons(chat, message_id, &text)
                    .await
            }
            Action::FetchAndPublishRaw { kind, file_id } => {
                self.fetch_and_publish_raw(chat, kind, &file_id).await
            }
            Action::PublishVerified {
                analysis,
                kind,
                amount,
            } => self.publish_verified(chat, analysis, kind, amount).await,
        }
    }

    async fn fetch_and_publish_raw(&self, chat: i64, kind: AttachmentType, file_id: &str) {
        let bytes = match self.gateway.fetch_file_bytes(file_id).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(chat, error = %err, "attachment fetch failed");
                self.gateway.send_text(chat, FILE_FAILED_TEXT).await;
                return;
            }
        };

        let envelope = RawAttachment {
            source_id: chat,
            attachment_type: kind,
            attachment_data: BASE64.encode(&bytes),
            timestamp: now_ms(),
        };

        match self.publisher.publish(&self.raw_topic, chat, &envelope).await {
            Ok(()) => {
                info!(chat, bytes = bytes.len(), "attachment published");
                self.gateway.send_text(chat, FILE_RECEIVED_TEXT).await;
            }
            Err(err) => {
                warn!(chat, error = %err, "raw publish failed");
                self.gateway.send_text(chat, FILE_FAILED_TEXT).await;
            }
        }
    }

    async fn publish_verified(
        &self,
        chat: i64,
        analysis: LoanAnalysis,
        kind: FinancingType,
        amount: f64,
    ) {
        let envelope = VerifiedLoan {
            source_id: chat,
            agent_analysis: analysis,
            financing_info: FinancingInfo {
                kind: kind.as_str().to_string(),
                value: amount,
            },
            timestamp: now_ms(),
        };

        if let Err(err) = self
            .publisher
            .publish(&self.verified_topic, chat, &envelope)
            .await
        {
            warn!(chat, error = %err, "verified publish failed");
            self.gateway.send_text(chat, INTERNAL_ERROR_TEXT).await;
        } else {
            info!(chat, kind = kind.as_str(), amount, "verified envelope published");
        }
    }
}

fn keyboard_markup(kind: KeyboardKind) -> InlineKeyboardMarkup {
    match kind {
        KeyboardKind::YesNo => InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("✅ Sim", fsm::CALLBACK_FINANCE_YES.to_string()),
            InlineKeyboardButton::callback("❌ Não", fsm::CALLBACK_FINANCE_NO.to_string()),
        ]]),
        KeyboardKind::FinancingType => InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback(
                "🚗 Automóvel",
                fsm::CALLBACK_TYPE_AUTOMOBILE.to_string(),
            ),
            InlineKeyboardButton::callback("🏠 Imóvel", fsm::CALLBACK_TYPE_PROPERTY.to_string()),
        ]]),
    }
}
