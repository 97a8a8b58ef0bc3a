//! Envelope schemas, one per topic. Every envelope shares a `source_id`
//! (the originating chat, always positive) and a millisecond `timestamp`
//! assigned at publish time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Document,
}

/// Payload on the `raw` topic: a user-submitted attachment, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAttachment {
    pub source_id: i64,
    pub attachment_type: AttachmentType,
    pub attachment_data: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Summary,
    LineItem,
}

/// One OCR field as emitted by the expense analysis. Either side may be
/// absent; confidences are 0–100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrField {
    pub source: FieldSource,
    pub label_text: Option<String>,
    pub label_conf: Option<f64>,
    pub value_text: Option<String>,
    pub value_conf: Option<f64>,
}

/// Payload on the `parsed` topic: the ordered, flattened OCR field list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub source_id: i64,
    pub attachment_parsed: Vec<OcrField>,
    pub timestamp: i64,
}

/// What the interpreter recovered from a document. Fields it could not
/// resolve stay null. When both counters are set, `1 <= current <= total
/// <= 240` holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanAnalysis {
    pub company: Option<String>,
    pub installment_count: Option<i32>,
    pub current_installment_number: Option<i32>,
    pub installment_amount: Option<f64>,
}

impl LoanAnalysis {
    /// Name of the first unresolved field, used by stages that require a
    /// complete analysis to log exactly what was missing.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.company.is_none() {
            Some("company")
        } else if self.installment_count.is_none() {
            Some("installment_count")
        } else if self.current_installment_number.is_none() {
            Some("current_installment_number")
        } else if self.installment_amount.is_none() {
            Some("installment_amount")
        } else {
            None
        }
    }
}

/// Payload on the `interpreted` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretedDocument {
    pub source_id: i64,
    pub agent_analysis: LoanAnalysis,
    pub timestamp: i64,
}

/// Financing product families the catalog distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancingType {
    Automobile,
    Property,
}

impl FinancingType {
    /// Wire / catalog spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            FinancingType::Automobile => "automobile",
            FinancingType::Property => "property",
        }
    }

    /// Parses the wire spelling, case-insensitively. Anything else is an
    /// unknown financing type and the caller drops the message.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "automobile" => Some(FinancingType::Automobile),
            "property" => Some(FinancingType::Property),
            _ => None,
        }
    }

    /// Label shown to the user in chat.
    pub fn label(self) -> &'static str {
        match self {
            FinancingType::Automobile => "Automóvel",
            FinancingType::Property => "Imóvel",
        }
    }
}

/// What the user asked to finance. The type is carried as a plain string so
/// that malformed requests travel to the matcher, which owns the
/// unknown-type rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

/// Payload on the `verified` topic: the interpreted analysis plus the
/// conversationally collected financing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedLoan {
    pub source_id: i64,
    pub agent_analysis: LoanAnalysis,
    pub financing_info: FinancingInfo,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMetadata {
    pub id: i64,
    pub full_name: String,
}

/// Account figures joined by the enricher. A user without an account row is
/// represented as all zeroes, not dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub credit_limit: f64,
    pub credit_usage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: i64,
    pub transaction_ts: i64,
    pub transaction_type: String,
    pub amount: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentRecord {
    pub investment_id: i64,
    pub investment_name: String,
    pub invested_amount: i64,
    pub invested_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub user_metadata: UserMetadata,
    pub account: AccountSnapshot,
    pub transactions: Vec<TransactionRecord>,
    pub investments: Vec<InvestmentRecord>,
}

/// Payload on the `enriched` topic: everything upstream, plus the user's
/// profile, account, and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedLoan {
    pub source_id: i64,
    pub agent_analysis: LoanAnalysis,
    pub user_data: UserData,
    pub financing_info: FinancingInfo,
    pub timestamp: i64,
}

/// The better deal the matcher found. Rates are monthly percent; amounts
/// are BRL, rounded to cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibleOffer {
    pub remaining_finance_amount: f64,
    pub current_finance_month_tax: f64,
    pub new_finance_month_tax: f64,
    pub new_financing_amount: f64,
    pub potential_savings: f64,
}

/// Payload on the `matched` topic. `eligible_offer` is present exactly when
/// `offer_available` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedLoan {
    pub source_id: i64,
    pub agent_analysis: LoanAnalysis,
    pub offer_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_offer: Option<EligibleOffer>,
    pub timestamp: i64,
}

/// Payload on the `composed` topic: the final human-facing message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedOffer {
    pub source_id: i64,
    pub offer_message: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_attachment_round_trips() {
        let value = json!({
            "source_id": 42,
            "attachment_type": "image",
            "attachment_data": "aGVsbG8=",
            "timestamp": 1700000000000i64,
        });
        let raw: RawAttachment = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(raw.attachment_type, AttachmentType::Image);
        assert_eq!(serde_json::to_value(&raw).unwrap(), value);
    }

    #[test]
    fn loan_analysis_reports_first_missing_field() {
        let mut analysis = LoanAnalysis {
            company: Some("Banco Votorantim".into()),
            installment_count: Some(60),
            current_installment_number: None,
            installment_amount: Some(630.62),
        };
        assert_eq!(analysis.missing_field(), Some("current_installment_number"));
        analysis.current_installment_number = Some(12);
        assert_eq!(analysis.missing_field(), None);
    }

    #[test]
    fn matched_without_offer_omits_eligible_offer() {
        let matched = MatchedLoan {
            source_id: 7,
            agent_analysis: LoanAnalysis::default(),
            offer_available: false,
            eligible_offer: None,
            timestamp: 1,
        };
        let value = serde_json::to_value(&matched).unwrap();
        assert!(value.get("eligible_offer").is_none());
    }

    #[test]
    fn unknown_financing_type_travels_as_string() {
        let value = json!({
            "source_id": 9,
            "agent_analysis": {
                "company": "Banco BV",
                "installment_count": 12,
                "current_installment_number": 3,
                "installment_amount": 500.0,
            },
            "financing_info": {"type": "boat", "value": 10000.0},
            "timestamp": 5,
        });
        let verified: VerifiedLoan = serde_json::from_value(value).unwrap();
        assert_eq!(verified.financing_info.kind, "boat");
        assert!(FinancingType::parse(&verified.financing_info.kind).is_none());
    }

    #[test]
    fn financing_type_parse_is_case_insensitive() {
        assert_eq!(
            FinancingType::parse("Automobile"),
            Some(FinancingType::Automobile)
        );
        assert_eq!(
            FinancingType::parse("PROPERTY"),
            Some(FinancingType::Property)
        );
        assert_eq!(FinancingType::parse(""), None);
    }
}
