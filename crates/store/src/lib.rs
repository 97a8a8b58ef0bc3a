//! Postgres gateway: a bounded connection pool plus one store per domain
//! concern. All queries are parameterized; writes that span statements go
//! through a transaction that rolls back unless committed.

use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod banks;
pub mod catalog;
pub mod offers;
pub mod users;

pub use banks::BankStore;
pub use catalog::{CatalogOffer, CatalogStore};
pub use offers::{OfferStore, OfferUpdate, OfferView};
pub use users::UserStore;

const MAX_CONNECTIONS: u32 = 10;

/// Owns the pool. Domain stores borrow clones of it (sqlx pools are
/// reference-counted handles).
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connects using the conventional `PG*` environment variables.
    pub async fn connect_from_env() -> anyhow::Result<Self> {
        let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
        let database = std::env::var("PGDATABASE").unwrap_or_else(|_| "postgres".to_string());
        let user = std::env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string());
        let password = std::env::var("PGPASSWORD").unwrap_or_default();

        let url = format!("postgresql://{user}:{password}@{host}:{port}/{database}");
        Self::connect(&url).await
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// `SELECT 1` probe used by the health endpoints.
    pub async fn healthcheck(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(value) => value == 1,
            Err(err) => {
                tracing::warn!(error = %err, "healthcheck failed");
                false
            }
        }
    }
}
