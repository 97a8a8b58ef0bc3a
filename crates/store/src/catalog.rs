//! The financing-product catalog the matcher queries.

use anyhow::Result;
use refino_core::FinancingType;
use sqlx::{PgPool, Row};

/// A catalog row. `tax_mes` is a monthly rate as a decimal fraction
/// (0.015 = 1.5% a.m.).
#[derive(Debug, Clone)]
pub struct CatalogOffer {
    pub id: i64,
    pub name: String,
    pub tax_mes: f64,
    pub max_amount: f64,
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cheapest product of the requested type that beats the user's current
    /// rate and covers the remaining balance.
    pub async fn find_best_offer(
        &self,
        kind: FinancingType,
        current_rate_decimal: f64,
        remaining_amount: f64,
    ) -> Result<Option<CatalogOffer>> {
        let row = sqlx::query(
            "SELECT id, name, tax_mes, max_amount
             FROM financing_types
             WHERE LOWER(type) = LOWER($1)
               AND tax_mes < $2
               AND max_amount >= $3
             ORDER BY tax_mes ASC
             LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(current_rate_decimal)
        .bind(remaining_amount)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<CatalogOffer> {
            Ok(CatalogOffer {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                tax_mes: r.try_get("tax_mes")?,
                max_amount: r.try_get("max_amount")?,
            })
        })
        .transpose()
    }
}
