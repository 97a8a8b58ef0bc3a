use anyhow::Result;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct BankRow {
    pub id: i64,
    pub name: String,
}

#[derive(Clone)]
pub struct BankStore {
    pool: PgPool,
}

impl BankStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn all(&self) -> Result<Vec<BankRow>> {
        let rows = sqlx::query("SELECT id, name FROM banks ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| -> Result<BankRow> {
                Ok(BankRow {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                })
            })
            .collect()
    }

    /// Registers a company the catalog has never seen and returns its id.
    pub async fn add(&self, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>("INSERT INTO banks (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        tracing::info!(bank = name, id, "new bank registered");
        Ok(id)
    }
}
