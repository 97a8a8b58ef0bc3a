//! User-facing lookups: chat → user resolution, profile, account figures,
//! and the transaction/investment history the enricher joins in.

use anyhow::Result;
use refino_core::{AccountSnapshot, InvestmentRecord, TransactionRecord, UserMetadata};
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolves the chat's `source_id` to an internal user id, if the chat
    /// has ever been linked.
    pub async fn user_id_from_source(&self, source_id: i64) -> Result<Option<i64>> {
        let user_id =
            sqlx::query_scalar::<_, i64>("SELECT user_id FROM user_source WHERE source_id = $1")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user_id)
    }

    pub async fn user_metadata(&self, user_id: i64) -> Result<Option<UserMetadata>> {
        let row = sqlx::query("SELECT user_id, full_name FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<UserMetadata> {
            Ok(UserMetadata {
                id: r.try_get("user_id")?,
                full_name: r.try_get("full_name")?,
            })
        })
        .transpose()
    }

    pub async fn account_data(&self, user_id: i64) -> Result<Option<AccountSnapshot>> {
        let row = sqlx::query(
            "SELECT balance, credit_limit, credit_usage FROM accounts WHERE user_id = $1 LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<AccountSnapshot> {
            Ok(AccountSnapshot {
                balance: r.try_get::<Option<f64>, _>("balance")?.unwrap_or_default(),
                credit_limit: r
                    .try_get::<Option<f64>, _>("credit_limit")?
                    .unwrap_or_default(),
                credit_usage: r
                    .try_get::<Option<f64>, _>("credit_usage")?
                    .unwrap_or_default(),
            })
        })
        .transpose()
    }

    /// Full transaction history, newest first.
    pub async fn transactions(&self, user_id: i64) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            "SELECT transaction_id,
                    CAST(EXTRACT(EPOCH FROM transaction_ts) AS BIGINT) AS transaction_ts,
                    transaction_type,
                    amount,
                    description
             FROM transactions
             WHERE user_id = $1
             ORDER BY transaction_ts DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<TransactionRecord> {
                Ok(TransactionRecord {
                    transaction_id: r.try_get("transaction_id")?,
                    transaction_ts: r.try_get("transaction_ts")?,
                    transaction_type: r.try_get("transaction_type")?,
                    amount: r.try_get::<Option<f64>, _>("amount")?.unwrap_or_default(),
                    description: r
                        .try_get::<Option<String>, _>("description")?
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    pub async fn investments(&self, user_id: i64) -> Result<Vec<InvestmentRecord>> {
        let rows = sqlx::query(
            "SELECT i.investment_id,
                    i.investment_name,
                    i.invested_amount,
                    CAST(EXTRACT(EPOCH FROM i.invested_at) AS BIGINT) AS invested_at
             FROM investments i
             JOIN accounts a ON i.account_id = a.account_id
             WHERE a.user_id = $1
             ORDER BY i.invested_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<InvestmentRecord> {
                Ok(InvestmentRecord {
                    investment_id: r.try_get("investment_id")?,
                    investment_name: r
                        .try_get::<Option<String>, _>("investment_name")?
                        .unwrap_or_default(),
                    invested_amount: r
                        .try_get::<Option<i64>, _>("invested_amount")?
                        .unwrap_or_default(),
                    invested_at: r.try_get("invested_at")?,
                })
            })
            .collect()
    }

    /// Whether the user has a boleto payment matching the extracted
    /// installment amount to the cent.
    pub async fn has_matching_boleto(&self, user_id: i64, installment_amount: f64) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)
             FROM transactions
             WHERE user_id = $1
               AND ABS(amount - $2) < 0.01
               AND transaction_type = 'boleto'",
        )
        .bind(user_id)
        .bind(installment_amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
