//! The conversation state machine, as pure data: a transition function from
//! (conversation, event) to (conversation, actions). Side effects (chat
//! sends, bus publishes) are described as [`Action`]s and executed by the
//! actor, which keeps this module trivially testable.

use refino_core::{AttachmentType, FinancingType, LoanAnalysis, money::fmt_brl};

pub const CALLBACK_FINANCE_YES: &str = "financiamento_sim";
pub const CALLBACK_FINANCE_NO: &str = "financiamento_nao";
pub const CALLBACK_TYPE_AUTOMOBILE: &str = "tipo_automovel";
pub const CALLBACK_TYPE_PROPERTY: &str = "tipo_imovel";

pub const HELP_TEXT: &str = "Recebi o texto. Envie uma foto ou um PDF, ou digite /financiamento.";
pub const ASK_FINANCING_TEXT: &str = "Gostaria de fazer um financiamento?";
pub const ASK_TYPE_TEXT: &str = "Ótimo! Esse financiamento seria para automóvel ou imóvel?";
pub const OPPORTUNITY_TEXT: &str =
    "Olá! Identificamos uma oportunidade. Esse financiamento seria para automóvel ou imóvel?";
pub const CLOSURE_TEXT: &str = "Pagamento finalizado.";
pub const FINISH_PREVIOUS_TEXT: &str =
    "Por favor, termine a conversa anterior antes de enviar um novo arquivo.";
pub const USE_BUTTONS_TEXT: &str = "Use os botões para responder.";
pub const INVALID_AMOUNT_TEXT: &str =
    "❌ Por favor, digite um valor numérico válido. Ex.: 50000 ou 50.000";
pub const NON_POSITIVE_AMOUNT_TEXT: &str = "❌ O valor deve ser maior que zero. Tente novamente.";
pub const FILE_RECEIVED_TEXT: &str = "✅ Arquivo recebido e enviado para processamento.";
pub const FILE_FAILED_TEXT: &str = "❌ Erro ao processar o arquivo. Tente novamente.";
pub const INTERNAL_ERROR_TEXT: &str =
    "❌ Erro interno. Por favor, reinicie o fluxo com /financiamento.";

pub fn ask_amount_text(kind: FinancingType) -> String {
    format!(
        "Perfeito! Para {}, qual o valor aproximado que você gostaria de financiar? \
         (Digite apenas o número, ex: 50000)",
        kind.label()
    )
}

pub fn interest_registered_text(kind: FinancingType, amount: f64) -> String {
    format!(
        "Perfeito! Registramos seu interesse em financiamento para {} no valor de {}. \
         Um de nossos especialistas entrará em contato para falar sobre as opções de crédito.",
        kind.label(),
        fmt_brl(amount)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvState {
    #[default]
    Idle,
    AwaitYesNo,
    AwaitType,
    AwaitAmount(FinancingType),
}

/// Per-chat conversation. `pending_analysis` is the document analysis
/// captured when the verifier triggered the flow; it is dropped on every
/// terminal transition.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub state: ConvState,
    pub pending_analysis: Option<LoanAnalysis>,
}

#[derive(Debug, Clone)]
pub enum Event {
    Text { text: String },
    Attachment { kind: AttachmentType, file_id: String },
    Callback { message_id: i32, data: String },
    VerifierTrigger { analysis: LoanAnalysis },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardKind {
    YesNo,
    FinancingType,
}

/// A side effect the actor must perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendText(String),
    SendKeyboard {
        text: String,
        keyboard: KeyboardKind,
    },
    EditAndClear {
        message_id: i32,
        text: String,
    },
    FetchAndPublishRaw {
        kind: AttachmentType,
        file_id: String,
    },
    PublishVerified {
        analysis: LoanAnalysis,
        kind: FinancingType,
        amount: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountParse {
    Valid(f64),
    NonPositive,
    Invalid,
}

/// Parses the free-text financing amount: everything but digits, `.` and `,`
/// is stripped; the comma is the decimal separator when it is the last
/// grouping symbol (Brazilian convention), otherwise a thousands separator.
pub fn parse_amount(text: &str) -> AmountParse {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return AmountParse::Invalid;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, _) => cleaned,
    };

    match normalized.parse::<f64>() {
        Ok(value) if value > 0.0 => AmountParse::Valid(value),
        Ok(_) => AmountParse::NonPositive,
        Err(_) => AmountParse::Invalid,
    }
}

fn financing_type_from_callback(data: &str) -> Option<FinancingType> {
    match data {
        CALLBACK_TYPE_AUTOMOBILE => Some(FinancingType::Automobile),
        CALLBACK_TYPE_PROPERTY => Some(FinancingType::Property),
        _ => None,
    }
}

/// The transition function. Never performs I/O; the returned conversation
/// replaces the stored one and the actions run in order.
pub fn transition(conv: &Conversation, event: Event) -> (Conversation, Vec<Action>) {
    match (conv.state, event) {
        // A verifier trigger (re)starts the collection flow in any state.
        (_, Event::VerifierTrigger { analysis }) => (
            Conversation {
                state: ConvState::AwaitType,
                pending_analysis: Some(analysis),
            },
            vec![Action::SendKeyboard {
                text: OPPORTUNITY_TEXT.to_string(),
                keyboard: KeyboardKind::FinancingType,
            }],
        ),

        (ConvState::Idle, Event::Text { text }) => {
            if text.trim() == "/financiamento" {
                (
                    Conversation {
                        state: ConvState::AwaitYesNo,
                        pending_analysis: None,
                    },
                    vec![Action::SendKeyboard {
                        text: ASK_FINANCING_TEXT.to_string(),
                        keyboard: KeyboardKind::YesNo,
                    }],
                )
            } else {
                (
                    conv.clone(),
                    vec![Action::SendText(HELP_TEXT.to_string())],
                )
            }
        }

        (ConvState::Idle, Event::Attachment { kind, file_id }) => (
            conv.clone(),
            vec![Action::FetchAndPublishRaw { kind, file_id }],
        ),

        // Mid-flow attachments are refused; the flow in progress survives.
        (_, Event::Attachment { .. }) => (
            conv.clone(),
            vec![Action::SendText(FINISH_PREVIOUS_TEXT.to_string())],
        ),

        (ConvState::AwaitYesNo, Event::Callback { message_id, data }) => match data.as_str() {
            CALLBACK_FINANCE_YES => (
                Conversation {
                    state: ConvState::AwaitType,
                    pending_analysis: conv.pending_analysis.clone(),
                },
                vec![
                    Action::EditAndClear {
                        message_id,
                        text: "Resposta: ✅ Sim".to_string(),
                    },
                    Action::SendKeyboard {
                        text: ASK_TYPE_TEXT.to_string(),
                        keyboard: KeyboardKind::FinancingType,
                    },
                ],
            ),
            CALLBACK_FINANCE_NO => (
                Conversation::default(),
                vec![
                    Action::EditAndClear {
                        message_id,
                        text: "Resposta: ❌ Não".to_string(),
                    },
                    Action::SendText(CLOSURE_TEXT.to_string()),
                ],
            ),
            _ => (conv.clone(), vec![]),
        },

        (ConvState::AwaitType, Event::Callback { message_id, data }) => {
            match financing_type_from_callback(&data) {
                Some(kind) => (
                    Conversation {
                        state: ConvState::AwaitAmount(kind),
                        pending_analysis: conv.pending_analysis.clone(),
                    },
                    vec![
                        Action::EditAndClear {
                            message_id,
                            text: format!("✅ Escolhido: {}", kind.label()),
                        },
                        Action::SendText(ask_amount_text(kind)),
                    ],
                ),
                None => (conv.clone(), vec![]),
            }
        }

        (ConvState::AwaitAmount(kind), Event::Text { text }) => match parse_amount(&text) {
            AmountParse::Valid(amount) => {
                let mut actions = Vec::new();
                if let Some(analysis) = conv.pending_analysis.clone() {
                    actions.push(Action::PublishVerified {
                        analysis,
                        kind,
                        amount,
                    });
                }
                actions.push(Action::SendText(interest_registered_text(kind, amount)));
                (Conversation::default(), actions)
            }
            AmountParse::NonPositive => (
                conv.clone(),
                vec![Action::SendText(NON_POSITIVE_AMOUNT_TEXT.to_string())],
            ),
            AmountParse::Invalid => (
                conv.clone(),
                vec![Action::SendText(INVALID_AMOUNT_TEXT.to_string())],
            ),
        },

        // Free text while a keyboard is pending: nudge towards the buttons.
        (ConvState::AwaitYesNo | ConvState::AwaitType, Event::Text { .. }) => (
            conv.clone(),
            vec![Action::SendText(USE_BUTTONS_TEXT.to_string())],
        ),

        // Stray callbacks (stale keyboards, unknown data) are ignored; the
        // actor still acks them.
        (_, Event::Callback { .. }) => (conv.clone(), vec![]),
    }
}
