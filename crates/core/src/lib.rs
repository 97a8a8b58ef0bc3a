//! Shared types for the refinancing pipeline: the envelopes carried on the
//! bus, the financing-type vocabulary, and Brazilian money/rate formatting.

pub mod envelope;
pub mod money;

pub use envelope::{
    AccountSnapshot, AttachmentType, ComposedOffer, EligibleOffer, EnrichedLoan, FieldSource,
    FinancingInfo, FinancingType, InterpretedDocument, InvestmentRecord, LoanAnalysis, MatchedLoan,
    OcrField, ParsedDocument, RawAttachment, TransactionRecord, UserData, UserMetadata,
    VerifiedLoan,
};

/// Milliseconds since the epoch, the timestamp unit used on every envelope.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Round to two decimal places, the precision published in offer envelopes
/// and persisted on offer rows.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::round2;

    #[test]
    fn round2_truncates_to_cents() {
        assert_eq!(round2(1234.5678), 1234.57);
        assert_eq!(round2(0.004), 0.0);
        assert_eq!(round2(-1.005), -1.0);
    }
}
