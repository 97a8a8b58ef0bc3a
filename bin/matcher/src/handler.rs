//! `enriched` → `matched`: recover the rate the user is paying, look for a
//! cheaper catalog product, publish the verdict, and record it on the offer
//! row.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use refino_bus::{Publisher, StageHandler};
use refino_core::{EligibleOffer, EnrichedLoan, FinancingType, MatchedLoan, round2};
use refino_llm::{LlmClient, extract_first_json};
use refino_store::banks::BankRow;
use refino_store::{BankStore, CatalogOffer, CatalogStore, OfferStore, OfferUpdate};

use crate::rates::{
    Amortization, potential_savings, price_monthly_rate, remaining_balance, sac_monthly_rate,
};

pub struct MatchHandler {
    pub catalog: CatalogStore,
    pub banks: BankStore,
    pub offers: OfferStore,
    pub llm: LlmClient,
    pub publisher: Publisher,
}

#[async_trait]
impl StageHandler for MatchHandler {
    type Msg = EnrichedLoan;

    async fn handle(&self, msg: EnrichedLoan) -> Result<()> {
        if let Some(field) = msg.agent_analysis.missing_field() {
            warn!(
                source_id = msg.source_id,
                field, "message discarded: analysis incomplete"
            );
            return Ok(());
        }

        let Some(kind) = FinancingType::parse(&msg.financing_info.kind) else {
            warn!(
                source_id = msg.source_id,
                kind = %msg.financing_info.kind,
                "unknown financing type, dropping"
            );
            return Ok(());
        };

        let total_value = msg.financing_info.value;
        let count = msg.agent_analysis.installment_count.unwrap_or_default();
        let current = msg
            .agent_analysis
            .current_installment_number
            .unwrap_or_default();
        let amount = msg.agent_analysis.installment_amount.unwrap_or_default();

        let system = amortization_for(kind);
        let rate = match system {
            Amortization::Price => price_monthly_rate(total_value, count, amount),
            Amortization::Sac => sac_monthly_rate(total_value, count, current, amount),
        };
        let Some(rate) = rate else {
            warn!(
                source_id = msg.source_id,
                "interest rate could not be recovered, dropping"
            );
            return Ok(());
        };

        let remaining = remaining_balance(system, total_value, count, current, rate, amount);
        let remaining_installments = count - current + 1;

        info!(
            source_id = msg.source_id,
            rate_percent = rate,
            remaining,
            remaining_installments,
            "current loan measured"
        );

        let best = self
            .catalog
            .find_best_offer(kind, rate / 100.0, remaining)
            .await?;

        let (matched, savings) = build_matched(&msg, rate, remaining, remaining_installments, best.as_ref());
        self.publisher
            .publish(&crate::OUTPUT_TOPIC, matched.source_id, &matched)
            .await?;
        info!(
            source_id = msg.source_id,
            offer_available = matched.offer_available,
            "matched envelope published"
        );

        if let Err(err) = self
            .persist_offer(&msg, kind, rate, remaining, savings, best.as_ref())
            .await
        {
            warn!(source_id = msg.source_id, error = %err, "offer row update failed");
        }
        Ok(())
    }
}

pub fn amortization_for(kind: FinancingType) -> Amortization {
    match kind {
        FinancingType::Automobile => Amortization::Price,
        FinancingType::Property => Amortization::Sac,
    }
}

/// Assembles the outgoing envelope; returns it with the (unrounded) savings
/// so the persistence step reuses the same number.
pub fn build_matched(
    msg: &EnrichedLoan,
    rate_percent: f64,
    remaining: f64,
    remaining_installments: i32,
    best: Option<&CatalogOffer>,
) -> (MatchedLoan, f64) {
    match best {
        Some(offer) => {
            let new_rate_percent = offer.tax_mes * 100.0;
            let savings = potential_savings(
                remaining,
                remaining_installments,
                rate_percent,
                new_rate_percent,
            );
            let matched = MatchedLoan {
                source_id: msg.source_id,
                agent_analysis: msg.agent_analysis.clone(),
                offer_available: true,
                eligible_offer: Some(EligibleOffer {
                    remaining_finance_amount: round2(remaining),
                    current_finance_month_tax: round2(rate_percent),
                    new_finance_month_tax: round2(new_rate_percent),
                    new_financing_amount: round2(offer.max_amount),
                    potential_savings: round2(savings),
                }),
                timestamp: msg.timestamp,
            };
            (matched, savings)
        }
        None => (
            MatchedLoan {
                source_id: msg.source_id,
                agent_analysis: msg.agent_analysis.clone(),
                offer_available: false,
                eligible_offer: None,
                timestamp: msg.timestamp,
            },
            0.0,
        ),
    }
}

impl MatchHandler {
    async fn persist_offer(
        &self,
        msg: &EnrichedLoan,
        kind: FinancingType,
        rate_percent: f64,
        remaining: f64,
        savings: f64,
        best: Option<&CatalogOffer>,
    ) -> Result<()> {
        let Some(company) = msg
            .agent_analysis
            .company
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        else {
            warn!("no company name in analysis, skipping offer row");
            return Ok(());
        };
        let user_id = msg.user_data.user_metadata.id;

        let known = self.banks.all().await?;
        if known.is_empty() {
            warn!("no banks registered, skipping offer row");
            return Ok(());
        }
        let Some(bank_id) = self.resolve_bank_id(company, &known).await else {
            warn!(company, "company did not match any bank, skipping offer row");
            return Ok(());
        };

        let total_value = msg.financing_info.value;
        let count = msg.agent_analysis.installment_count.unwrap_or_default();
        let total_with_interest = total_value * (1.0 + rate_percent / 100.0 * count as f64);

        let update = match best {
            Some(offer) => OfferUpdate {
                bank_id,
                user_id,
                asset_value: total_value,
                monthly_interest_rate: rate_percent / 100.0,
                total_value_with_interest: total_with_interest,
                installments_count: count,
                financing_type: kind.as_str().to_string(),
                offered: true,
                offered_interest_rate: Some(offer.tax_mes),
                offer_id: Some(offer.id.to_string()),
                financed_amount: Some(remaining),
                savings_amount: Some(savings),
            },
            None => OfferUpdate {
                bank_id,
                user_id,
                asset_value: total_value,
                monthly_interest_rate: rate_percent / 100.0,
                total_value_with_interest: total_with_interest,
                installments_count: count,
                financing_type: kind.as_str().to_string(),
                offered: false,
                offered_interest_rate: None,
                offer_id: None,
                financed_amount: None,
                savings_amount: None,
            },
        };

        self.offers.apply_matched(&update).await?;
        Ok(())
    }

    async fn resolve_bank_id(&self, company: &str, known: &[BankRow]) -> Option<i64> {
        let (system, prompt) = bank_id_prompt(company, known);
        match self.llm.generate(&prompt, Some(&system)).await {
            Ok(response) => parse_bank_id(&response),
            Err(err) => {
                warn!(company, error = %err, "bank id llm call failed");
                None
            }
        }
    }
}

pub fn bank_id_prompt(company: &str, banks: &[BankRow]) -> (String, String) {
    let bank_list = banks
        .iter()
        .map(|b| format!("- {} (ID: {})", b.name, b.id))
        .collect::<Vec<_>>()
        .join("\n");

    let system = "You are a banking system assistant. Your job is to match company names \
                  to existing banks. Return ONLY a valid JSON object with the bank ID. \
                  No markdown, no explanations."
        .to_string();

    let prompt = format!(
        "Company name from analysis: \"{company}\"\n\
         \n\
         Available banks in our database:\n\
         {bank_list}\n\
         \n\
         Which bank ID matches this company? Return ONLY JSON format:\n\
         {{\"id\": 123}}"
    );

    (system, prompt)
}

pub fn parse_bank_id(response: &str) -> Option<i64> {
    extract_first_json(response)?.get("id").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refino_core::{
        AccountSnapshot, FinancingInfo, LoanAnalysis, UserData, UserMetadata,
    };

    fn enriched(kind: &str) -> EnrichedLoan {
        EnrichedLoan {
            source_id: 42,
            agent_analysis: LoanAnalysis {
                company: Some("Banco Votorantim".into()),
                installment_count: Some(60),
                current_installment_number: Some(12),
                installment_amount: Some(1_112.22),
            },
            user_data: UserData {
                user_metadata: UserMetadata {
                    id: 7,
                    full_name: "Maria da Silva".into(),
                },
                account: AccountSnapshot::default(),
                transactions: vec![],
                investments: vec![],
            },
            financing_info: FinancingInfo {
                kind: kind.to_string(),
                value: 50_000.0,
            },
            timestamp: 1_700_000_000_000,
        }
    }

    fn catalog_offer(tax_mes: f64) -> CatalogOffer {
        CatalogOffer {
            id: 11,
            name: "Auto Leve".into(),
            tax_mes,
            max_amount: 1_000_000.0,
        }
    }

    #[test]
    fn automobile_uses_price_and_property_uses_sac() {
        assert_eq!(
            amortization_for(FinancingType::Automobile),
            Amortization::Price
        );
        assert_eq!(amortization_for(FinancingType::Property), Amortization::Sac);
    }

    #[test]
    fn unknown_type_never_reaches_the_amortization_table() {
        assert!(FinancingType::parse("boat").is_none());
    }

    #[test]
    fn matched_with_offer_carries_rounded_figures() {
        let msg = enriched("automobile");
        let offer = catalog_offer(0.015);
        let (matched, savings) = build_matched(&msg, 3.0, 43_783.456, 49, Some(&offer));

        assert!(matched.offer_available);
        let eligible = matched.eligible_offer.unwrap();
        assert_eq!(eligible.remaining_finance_amount, 43_783.46);
        assert_eq!(eligible.current_finance_month_tax, 3.0);
        assert_eq!(eligible.new_finance_month_tax, 1.5);
        assert_eq!(eligible.new_financing_amount, 1_000_000.0);
        assert_eq!(eligible.potential_savings, round2(savings));
        assert!(savings > 0.0);
    }

    #[test]
    fn matched_without_offer_has_no_eligible_block() {
        let msg = enriched("automobile");
        let (matched, savings) = build_matched(&msg, 3.0, 43_783.456, 49, None);
        assert!(!matched.offer_available);
        assert!(matched.eligible_offer.is_none());
        assert_eq!(savings, 0.0);
    }

    #[test]
    fn catalog_offer_worse_than_current_rate_yields_zero_savings() {
        let msg = enriched("automobile");
        let offer = catalog_offer(0.05);
        let (matched, savings) = build_matched(&msg, 3.0, 43_783.456, 49, Some(&offer));
        // The catalog query should never hand this back, but the savings
        // clamp still holds.
        assert!(matched.offer_available);
        assert_eq!(savings, 0.0);
    }

    #[test]
    fn bank_id_parsing() {
        assert_eq!(parse_bank_id("{\"id\": 11}"), Some(11));
        assert_eq!(parse_bank_id("```json\n{\"id\": 2}\n```"), Some(2));
        assert_eq!(parse_bank_id("{\"name\": \"x\"}"), None);
        assert_eq!(parse_bank_id("no json"), None);
    }

    #[test]
    fn bank_id_prompt_enumerates_the_table() {
        let banks = vec![BankRow {
            id: 4,
            name: "Banco BV".into(),
        }];
        let (_, prompt) = bank_id_prompt("Banco BV", &banks);
        assert!(prompt.contains("- Banco BV (ID: 4)"));
        assert!(prompt.contains("{\"id\": 123}"));
    }
}
