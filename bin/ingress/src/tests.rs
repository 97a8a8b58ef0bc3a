use refino_core::{AttachmentType, FinancingType, LoanAnalysis};

use crate::actor::CallbackDebouncer;
use crate::fsm::{
    Action, AmountParse, CALLBACK_FINANCE_NO, CALLBACK_FINANCE_YES, CALLBACK_TYPE_AUTOMOBILE,
    CALLBACK_TYPE_PROPERTY, ConvState, Conversation, Event, KeyboardKind, parse_amount,
    transition,
};

fn sample_analysis() -> LoanAnalysis {
    LoanAnalysis {
        company: Some("Banco Votorantim".into()),
        installment_count: Some(60),
        current_installment_number: Some(12),
        installment_amount: Some(630.62),
    }
}

fn callback(message_id: i32, data: &str) -> Event {
    Event::Callback {
        message_id,
        data: data.to_string(),
    }
}

#[test]
fn financing_command_opens_yes_no_keyboard() {
    let (next, actions) = transition(
        &Conversation::default(),
        Event::Text {
            text: "/financiamento".into(),
        },
    );
    assert_eq!(next.state, ConvState::AwaitYesNo);
    assert!(matches!(
        actions.as_slice(),
        [Action::SendKeyboard {
            keyboard: KeyboardKind::YesNo,
            ..
        }]
    ));
}

#[test]
fn other_text_in_idle_sends_help_and_stays_idle() {
    let (next, actions) = transition(
        &Conversation::default(),
        Event::Text {
            text: "oi".into(),
        },
    );
    assert_eq!(next.state, ConvState::Idle);
    assert!(matches!(actions.as_slice(), [Action::SendText(_)]));
}

#[test]
fn attachment_in_idle_is_fetched_and_published() {
    let (next, actions) = transition(
        &Conversation::default(),
        Event::Attachment {
            kind: AttachmentType::Image,
            file_id: "file-1".into(),
        },
    );
    assert_eq!(next.state, ConvState::Idle);
    assert_eq!(
        actions,
        vec![Action::FetchAndPublishRaw {
            kind: AttachmentType::Image,
            file_id: "file-1".into(),
        }]
    );
}

#[test]
fn attachment_mid_flow_is_refused_without_state_change() {
    let conv = Conversation {
        state: ConvState::AwaitType,
        pending_analysis: Some(sample_analysis()),
    };
    let (next, actions) = transition(
        &conv,
        Event::Attachment {
            kind: AttachmentType::Document,
            file_id: "file-2".into(),
        },
    );
    assert_eq!(next.state, ConvState::AwaitType);
    assert!(next.pending_analysis.is_some());
    assert!(matches!(actions.as_slice(), [Action::SendText(_)]));
}

#[test]
fn yes_advances_to_type_selection() {
    let conv = Conversation {
        state: ConvState::AwaitYesNo,
        pending_analysis: None,
    };
    let (next, actions) = transition(&conv, callback(10, CALLBACK_FINANCE_YES));
    assert_eq!(next.state, ConvState::AwaitType);
    assert!(matches!(
        actions.as_slice(),
        [
            Action::EditAndClear { message_id: 10, .. },
            Action::SendKeyboard {
                keyboard: KeyboardKind::FinancingType,
                ..
            },
        ]
    ));
}

#[test]
fn no_closes_the_flow() {
    let conv = Conversation {
        state: ConvState::AwaitYesNo,
        pending_analysis: Some(sample_analysis()),
    };
    let (next, actions) = transition(&conv, callback(10, CALLBACK_FINANCE_NO));
    assert_eq!(next.state, ConvState::Idle);
    assert!(next.pending_analysis.is_none());
    assert_eq!(actions.len(), 2);
}

#[test]
fn type_choice_asks_for_the_amount() {
    let conv = Conversation {
        state: ConvState::AwaitType,
        pending_analysis: Some(sample_analysis()),
    };
    let (next, actions) = transition(&conv, callback(11, CALLBACK_TYPE_AUTOMOBILE));
    assert_eq!(
        next.state,
        ConvState::AwaitAmount(FinancingType::Automobile)
    );
    assert!(next.pending_analysis.is_some());
    assert!(matches!(
        actions.as_slice(),
        [Action::EditAndClear { .. }, Action::SendText(_)]
    ));

    let (next, _) = transition(&conv, callback(11, CALLBACK_TYPE_PROPERTY));
    assert_eq!(next.state, ConvState::AwaitAmount(FinancingType::Property));
}

#[test]
fn verifier_trigger_stores_pending_analysis() {
    let (next, actions) = transition(
        &Conversation::default(),
        Event::VerifierTrigger {
            analysis: sample_analysis(),
        },
    );
    assert_eq!(next.state, ConvState::AwaitType);
    assert!(next.pending_analysis.is_some());
    assert!(matches!(
        actions.as_slice(),
        [Action::SendKeyboard {
            keyboard: KeyboardKind::FinancingType,
            ..
        }]
    ));
}

#[test]
fn valid_amount_with_pending_analysis_publishes_verified() {
    let conv = Conversation {
        state: ConvState::AwaitAmount(FinancingType::Automobile),
        pending_analysis: Some(sample_analysis()),
    };
    let (next, actions) = transition(
        &conv,
        Event::Text {
            text: "50000".into(),
        },
    );
    assert_eq!(next.state, ConvState::Idle);
    assert!(next.pending_analysis.is_none());
    assert!(matches!(
        actions.as_slice(),
        [
            Action::PublishVerified {
                kind: FinancingType::Automobile,
                amount,
                ..
            },
            Action::SendText(_),
        ] if *amount == 50000.0
    ));
}

#[test]
fn valid_amount_without_pending_analysis_only_confirms() {
    let conv = Conversation {
        state: ConvState::AwaitAmount(FinancingType::Property),
        pending_analysis: None,
    };
    let (next, actions) = transition(
        &conv,
        Event::Text {
            text: "120.000,00".into(),
        },
    );
    assert_eq!(next.state, ConvState::Idle);
    assert!(matches!(actions.as_slice(), [Action::SendText(_)]));
}

#[test]
fn bad_amount_keeps_waiting_for_another_attempt() {
    let conv = Conversation {
        state: ConvState::AwaitAmount(FinancingType::Automobile),
        pending_analysis: Some(sample_analysis()),
    };

    let (next, actions) = transition(
        &conv,
        Event::Text {
            text: "abc".into(),
        },
    );
    assert_eq!(
        next.state,
        ConvState::AwaitAmount(FinancingType::Automobile)
    );
    assert!(next.pending_analysis.is_some());
    assert!(matches!(actions.as_slice(), [Action::SendText(_)]));

    let (next, _) = transition(
        &conv,
        Event::Text {
            text: "0".into(),
        },
    );
    assert_eq!(
        next.state,
        ConvState::AwaitAmount(FinancingType::Automobile)
    );
}

#[test]
fn stray_callback_is_ignored() {
    let (next, actions) = transition(&Conversation::default(), callback(5, "tipo_automovel"));
    assert_eq!(next.state, ConvState::Idle);
    assert!(actions.is_empty());

    let conv = Conversation {
        state: ConvState::AwaitYesNo,
        pending_analysis: None,
    };
    let (next, actions) = transition(&conv, callback(5, "unknown_data"));
    assert_eq!(next.state, ConvState::AwaitYesNo);
    assert!(actions.is_empty());
}

#[test]
fn amount_parsing_handles_brazilian_and_plain_formats() {
    assert_eq!(parse_amount("50000"), AmountParse::Valid(50000.0));
    assert_eq!(parse_amount("R$ 50.000"), AmountParse::Valid(50.0));
    assert_eq!(parse_amount("1.234,56"), AmountParse::Valid(1234.56));
    assert_eq!(parse_amount("1,234.56"), AmountParse::Valid(1234.56));
    assert_eq!(parse_amount("630,62"), AmountParse::Valid(630.62));
}

#[test]
fn amount_parsing_rejects_junk_and_non_positive() {
    assert_eq!(parse_amount(""), AmountParse::Invalid);
    assert_eq!(parse_amount("abc"), AmountParse::Invalid);
    assert_eq!(parse_amount("1.2.3.4"), AmountParse::Invalid);
    assert_eq!(parse_amount("0"), AmountParse::NonPositive);
    assert_eq!(parse_amount("0,00"), AmountParse::NonPositive);
}

#[test]
fn duplicate_callback_id_is_dropped() {
    let mut debouncer = CallbackDebouncer::default();
    assert!(debouncer.try_begin("cb-1", 42));
    debouncer.finish(42);
    assert!(!debouncer.try_begin("cb-1", 42));
}

#[test]
fn chat_with_tap_in_flight_is_dropped() {
    let mut debouncer = CallbackDebouncer::default();
    assert!(debouncer.try_begin("cb-1", 42));
    assert!(!debouncer.try_begin("cb-2", 42));
    debouncer.finish(42);
    assert!(debouncer.try_begin("cb-3", 42));
}
