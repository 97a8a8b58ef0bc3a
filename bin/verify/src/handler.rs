//! Verification of an interpreted document against the transactional store:
//! only users who actually paid a matching boleto get the conversational
//! follow-up, and a scaffold offer row is planted for the matcher to fill.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Months, NaiveDate, Utc};
use serde_json::Value;
use tracing::{info, warn};

use refino_bus::StageHandler;
use refino_core::{InterpretedDocument, LoanAnalysis};
use refino_llm::{LlmClient, extract_first_json};
use refino_store::banks::BankRow;
use refino_store::{BankStore, OfferStore, UserStore};

use crate::trigger::TriggerClient;

/// Installments at or below this are not worth refinancing.
pub const MIN_INSTALLMENT_AMOUNT: f64 = 300.0;

/// The threshold is exclusive: exactly 300.00 is still skipped.
pub fn clears_threshold(amount: f64) -> bool {
    amount > MIN_INSTALLMENT_AMOUNT
}

pub struct VerifyHandler {
    pub users: UserStore,
    pub banks: BankStore,
    pub offers: OfferStore,
    pub trigger: TriggerClient,
    pub llm: LlmClient,
}

#[async_trait]
impl StageHandler for VerifyHandler {
    type Msg = InterpretedDocument;

    async fn handle(&self, msg: InterpretedDocument) -> Result<()> {
        if let Some(field) = msg.agent_analysis.missing_field() {
            warn!(
                source_id = msg.source_id,
                field, "message discarded: analysis incomplete"
            );
            return Ok(());
        }
        let analysis = msg.agent_analysis.clone();
        let amount = analysis.installment_amount.unwrap_or_default();

        if !clears_threshold(amount) {
            info!(
                source_id = msg.source_id,
                amount, "installment below minimum threshold, skipping"
            );
            self.trigger.send_negative().await;
            return Ok(());
        }

        let Some(user_id) = self.users.user_id_from_source(msg.source_id).await? else {
            info!(source_id = msg.source_id, "no user linked to source, skipping");
            self.trigger.send_negative().await;
            return Ok(());
        };

        if !self.users.has_matching_boleto(user_id, amount).await? {
            info!(
                source_id = msg.source_id,
                user_id, "no matching boleto transaction"
            );
            self.trigger.send_negative().await;
            return Ok(());
        }

        self.trigger.send_positive(msg.source_id, &analysis).await;
        info!(source_id = msg.source_id, user_id, "recommendation triggered");

        if let Err(err) = self.record_scaffold(&analysis, user_id).await {
            warn!(user_id, error = %err, "scaffold offer step failed");
        }
        Ok(())
    }
}

impl VerifyHandler {
    /// Plants the offer row the matcher later fills in, resolving the
    /// document's company to a bank (registering it when unknown).
    async fn record_scaffold(&self, analysis: &LoanAnalysis, user_id: i64) -> Result<()> {
        let Some(company) = analysis.company.as_deref().filter(|c| !c.trim().is_empty()) else {
            warn!(user_id, "no company name in analysis, skipping scaffold");
            return Ok(());
        };

        let known = self.banks.all().await?;
        let bank_id = match self.resolve_bank(company, &known).await {
            BankMatch::Existing(id) => id,
            BankMatch::New => self.banks.add(company).await?,
        };

        let current = analysis.current_installment_number.unwrap_or_default();
        let count = analysis.installment_count.unwrap_or_default();
        let (year, month) = financing_start(Utc::now().date_naive(), current);

        self.offers
            .insert_scaffold(bank_id, user_id, month as i32, year, count)
            .await?;
        Ok(())
    }

    async fn resolve_bank(&self, company: &str, known: &[BankRow]) -> BankMatch {
        if known.is_empty() {
            return BankMatch::New;
        }

        let (system, prompt) = bank_match_prompt(company, known);
        match self.llm.generate(&prompt, Some(&system)).await {
            Ok(response) => parse_bank_match(&response),
            Err(err) => {
                warn!(company, error = %err, "bank matching llm call failed");
                BankMatch::New
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankMatch {
    Existing(i64),
    New,
}

pub fn bank_match_prompt(company: &str, banks: &[BankRow]) -> (String, String) {
    let bank_list = banks
        .iter()
        .map(|b| format!("- {} (ID: {})", b.name, b.id))
        .collect::<Vec<_>>()
        .join("\n");

    let system = "You are a banking system assistant. Your job is to match company names \
                  to existing banks. Return ONLY a valid JSON object, nothing else. \
                  No markdown, no explanations."
        .to_string();

    let prompt = format!(
        "Company name from analysis: \"{company}\"\n\
         \n\
         Available banks in our database:\n\
         {bank_list}\n\
         \n\
         Is this company name one of the banks above? If yes, return the ID. \
         If no, it's a new bank.\n\
         \n\
         Return ONLY this JSON format:\n\
         {{\"new_name\": false, \"id\": 123}}  (if it matches)\n\
         OR\n\
         {{\"new_name\": true}}  (if it's a new bank)"
    );

    (system, prompt)
}

/// Anything but an explicit `new_name: false` with an id means the company
/// is treated as new.
pub fn parse_bank_match(response: &str) -> BankMatch {
    let Some(data) = extract_first_json(response) else {
        return BankMatch::New;
    };
    if data.get("new_name").and_then(Value::as_bool) == Some(false)
        && let Some(id) = data.get("id").and_then(Value::as_i64)
    {
        return BankMatch::Existing(id);
    }
    BankMatch::New
}

/// When the financing started: today minus (current installment − 1) months.
pub fn financing_start(today: NaiveDate, current_installment: i32) -> (i32, u32) {
    let elapsed = current_installment.saturating_sub(1).max(0) as u32;
    let start = today
        .checked_sub_months(Months::new(elapsed))
        .unwrap_or(today);
    (start.year(), start.month())
}
