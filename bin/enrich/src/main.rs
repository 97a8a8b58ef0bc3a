//! Stage worker: `verified` → `enriched`. Joins the verified loan with the
//! user's profile, account figures, and full transaction/investment
//! history. An unknown user drops the message; a missing account row is
//! zero-filled, not fatal.

use anyhow::Result;
use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refino_bus::{Publisher, StageHandler, Subscriber};
use refino_core::{
    AccountSnapshot, EnrichedLoan, InvestmentRecord, TransactionRecord, UserData, UserMetadata,
    VerifiedLoan,
};
use refino_store::{Store, UserStore};

static KAFKA_BROKER_URL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("KAFKA_BROKER_URL").unwrap_or_else(|_| "localhost:9092".to_string())
});
static INPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("INPUT_TOPIC").unwrap_or_else(|_| "refino.verified".to_string())
});
static OUTPUT_TOPIC: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("OUTPUT_TOPIC").unwrap_or_else(|_| "refino.enriched".to_string())
});
static GROUP_ID: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    std::env::var("GROUP_ID").unwrap_or_else(|_| "refino-enrich".to_string())
});

/// A user without an account row still gets enriched, with zeroed figures.
fn build_user_data(
    metadata: UserMetadata,
    account: Option<AccountSnapshot>,
    transactions: Vec<TransactionRecord>,
    investments: Vec<InvestmentRecord>,
) -> UserData {
    UserData {
        user_metadata: metadata,
        account: account.unwrap_or_default(),
        transactions,
        investments,
    }
}

struct EnrichHandler {
    users: UserStore,
    publisher: Publisher,
}

#[async_trait]
impl StageHandler for EnrichHandler {
    type Msg = VerifiedLoan;

    async fn handle(&self, msg: VerifiedLoan) -> Result<()> {
        if let Some(field) = msg.agent_analysis.missing_field() {
            tracing::warn!(
                source_id = msg.source_id,
                field, "message discarded: analysis incomplete"
            );
            return Ok(());
        }

        let Some(user_id) = self.users.user_id_from_source(msg.source_id).await? else {
            tracing::warn!(
                source_id = msg.source_id,
                "no user linked to source, cannot enrich"
            );
            return Ok(());
        };

        let Some(metadata) = self.users.user_metadata(user_id).await? else {
            tracing::warn!(user_id, "user metadata not found, cannot enrich");
            return Ok(());
        };

        let account = self.users.account_data(user_id).await?;
        if account.is_none() {
            tracing::debug!(user_id, "no account row, zero-filling");
        }
        let transactions = self.users.transactions(user_id).await?;
        let investments = self.users.investments(user_id).await?;

        let enriched = EnrichedLoan {
            source_id: msg.source_id,
            agent_analysis: msg.agent_analysis,
            user_data: build_user_data(metadata, account, transactions, investments),
            financing_info: msg.financing_info,
            timestamp: msg.timestamp,
        };

        tracing::info!(source_id = enriched.source_id, user_id, "message enriched");
        self.publisher
            .publish(&OUTPUT_TOPIC, enriched.source_id, &enriched)
            .await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Store::connect_from_env().await?;
    let handler = EnrichHandler {
        users: UserStore::new(store.pool()),
        publisher: Publisher::connect(&KAFKA_BROKER_URL)?,
    };

    let subscriber = Subscriber::connect(&KAFKA_BROKER_URL, &GROUP_ID)?;
    tracing::info!(topic = %*INPUT_TOPIC, "enricher consuming");
    subscriber.run(&INPUT_TOPIC, &handler).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> UserMetadata {
        UserMetadata {
            id: 7,
            full_name: "Maria da Silva".into(),
        }
    }

    #[test]
    fn missing_account_is_zero_filled() {
        let data = build_user_data(metadata(), None, vec![], vec![]);
        assert_eq!(data.account.balance, 0.0);
        assert_eq!(data.account.credit_limit, 0.0);
        assert_eq!(data.account.credit_usage, 0.0);
    }

    #[test]
    fn present_account_is_kept() {
        let account = AccountSnapshot {
            balance: 1500.0,
            credit_limit: 5000.0,
            credit_usage: 1200.0,
        };
        let data = build_user_data(metadata(), Some(account), vec![], vec![]);
        assert_eq!(data.account.balance, 1500.0);
        assert_eq!(data.user_metadata.id, 7);
    }
}
