//! `bank_financing_offers` writes and the dashboard read view.
//!
//! Two write paths share the table: the verifier inserts a zero-filled
//! scaffold row when a document clears verification, and the matcher later
//! fills that row in. An `offered = TRUE` row with identical key fields is
//! never written twice.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct OfferStore {
    pool: PgPool,
}

/// Everything the matcher writes back onto an offer row. Rates are decimal
/// fractions here, matching the catalog's `tax_mes` unit.
#[derive(Debug, Clone)]
pub struct OfferUpdate {
    pub bank_id: i64,
    pub user_id: i64,
    pub asset_value: f64,
    pub monthly_interest_rate: f64,
    pub total_value_with_interest: f64,
    pub installments_count: i32,
    pub financing_type: String,
    pub offered: bool,
    pub offered_interest_rate: Option<f64>,
    pub offer_id: Option<String>,
    pub financed_amount: Option<f64>,
    pub savings_amount: Option<f64>,
}

/// Joined row served by the read API.
#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub id: i64,
    pub bank_name: Option<String>,
    pub user_id: i64,
    pub month: i32,
    pub year: i32,
    pub asset_value: f64,
    pub monthly_interest_rate: f64,
    pub total_value_with_interest: f64,
    pub installments_count: i32,
    #[serde(rename = "type")]
    pub financing_type: String,
    pub offered: bool,
    pub offered_interest_rate: Option<f64>,
    pub offer_id: Option<String>,
    pub financed_amount: Option<f64>,
    pub savings_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl OfferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the verifier's scaffold row unless one already exists for the
    /// same bank, user, start month/year, and installment count. Returns the
    /// row id either way.
    pub async fn insert_scaffold(
        &self,
        bank_id: i64,
        user_id: i64,
        month: i32,
        year: i32,
        installments_count: i32,
    ) -> Result<i64> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM bank_financing_offers
             WHERE bank_id = $1
               AND user_id = $2
               AND month = $3
               AND year = $4
               AND installments_count = $5
             LIMIT 1",
        )
        .bind(bank_id)
        .bind(user_id)
        .bind(month)
        .bind(year)
        .bind(installments_count)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            tracing::debug!(id, "scaffold offer already present, not duplicating");
            return Ok(id);
        }

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO bank_financing_offers
                 (bank_id, user_id, month, year,
                  asset_value, monthly_interest_rate, total_value_with_interest,
                  installments_count, type)
             VALUES ($1, $2, $3, $4, 0, 0, 0, $5, 'UNKNOWN')
             RETURNING id",
        )
        .bind(bank_id)
        .bind(user_id)
        .bind(month)
        .bind(year)
        .bind(installments_count)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(id, bank_id, user_id, "scaffold offer inserted");
        Ok(id)
    }

    /// Fills in the newest still-unoffered scaffold row for the bank, user
    /// and installment count. Returns the updated row id, or `None` when
    /// there was no row to update or the identical offer was already made.
    pub async fn apply_matched(&self, update: &OfferUpdate) -> Result<Option<i64>> {
        if update.offered {
            let duplicate = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (
                     SELECT 1 FROM bank_financing_offers
                     WHERE bank_id = $1
                       AND user_id = $2
                       AND asset_value = $3
                       AND monthly_interest_rate = $4
                       AND installments_count = $5
                       AND offered_interest_rate = $6
                       AND offered = TRUE
                 )",
            )
            .bind(update.bank_id)
            .bind(update.user_id)
            .bind(update.asset_value)
            .bind(update.monthly_interest_rate)
            .bind(update.installments_count)
            .bind(update.offered_interest_rate)
            .fetch_one(&self.pool)
            .await?;

            if duplicate {
                tracing::debug!(
                    bank_id = update.bank_id,
                    user_id = update.user_id,
                    "identical offer already recorded, skipping write"
                );
                return Ok(None);
            }
        }

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE bank_financing_offers
             SET asset_value = $1,
                 monthly_interest_rate = $2,
                 total_value_with_interest = $3,
                 type = $4,
                 offered = $5,
                 offered_interest_rate = $6,
                 offer_id = $7,
                 financed_amount = $8,
                 savings_amount = $9
             WHERE id = (
                 SELECT id
                 FROM bank_financing_offers
                 WHERE bank_id = $10
                   AND user_id = $11
                   AND installments_count = $12
                   AND offered = FALSE
                 ORDER BY created_at DESC
                 LIMIT 1
             )
             RETURNING id",
        )
        .bind(update.asset_value)
        .bind(update.monthly_interest_rate)
        .bind(update.total_value_with_interest)
        .bind(&update.financing_type)
        .bind(update.offered)
        .bind(update.offered_interest_rate)
        .bind(&update.offer_id)
        .bind(update.financed_amount)
        .bind(update.savings_amount)
        .bind(update.bank_id)
        .bind(update.user_id)
        .bind(update.installments_count)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        match updated {
            Some(id) => {
                tracing::info!(id, offered = update.offered, "offer row updated");
                Ok(Some(id))
            }
            None => {
                tracing::warn!(
                    bank_id = update.bank_id,
                    user_id = update.user_id,
                    "no unoffered row found to update"
                );
                Ok(None)
            }
        }
    }

    /// Dashboard view: all offers joined with their bank, newest first.
    pub async fn list_joined(&self) -> Result<Vec<OfferView>> {
        let rows = sqlx::query(
            "SELECT bfo.id,
                    b.name AS bank_name,
                    bfo.user_id,
                    bfo.month,
                    bfo.year,
                    bfo.asset_value,
                    bfo.monthly_interest_rate,
                    bfo.total_value_with_interest,
                    bfo.installments_count,
                    bfo.type,
                    bfo.offered,
                    bfo.offered_interest_rate,
                    bfo.offer_id,
                    bfo.financed_amount,
                    bfo.savings_amount,
                    bfo.created_at
             FROM bank_financing_offers bfo
             LEFT JOIN banks b ON bfo.bank_id = b.id
             ORDER BY bfo.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<OfferView> {
                Ok(OfferView {
                    id: r.try_get("id")?,
                    bank_name: r.try_get("bank_name")?,
                    user_id: r.try_get("user_id")?,
                    month: r.try_get("month")?,
                    year: r.try_get("year")?,
                    asset_value: r.try_get("asset_value")?,
                    monthly_interest_rate: r.try_get("monthly_interest_rate")?,
                    total_value_with_interest: r.try_get("total_value_with_interest")?,
                    installments_count: r.try_get("installments_count")?,
                    financing_type: r.try_get("type")?,
                    offered: r.try_get("offered")?,
                    offered_interest_rate: r.try_get("offered_interest_rate")?,
                    offer_id: r.try_get("offer_id")?,
                    financed_amount: r.try_get("financed_amount")?,
                    savings_amount: r.try_get("savings_amount")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }
}
