//! The verifier's only channel back to the conversation: a POST to the
//! ingress trigger endpoint. Delivery failures are logged and forgotten;
//! the verdict stands either way.

use std::time::Duration;

use anyhow::Result;
use refino_core::LoanAnalysis;
use serde_json::json;
use tracing::warn;

const POST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TriggerClient {
    http: reqwest::Client,
    url: String,
}

impl TriggerClient {
    pub fn new(url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(POST_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Starts the conversational collection of the financing info.
    pub async fn send_positive(&self, source_id: i64, analysis: &LoanAnalysis) {
        let payload = json!({
            "source_id": source_id,
            "agent_analysis": analysis,
            "trigger_recommendation": true,
        });
        self.post(payload).await;
    }

    pub async fn send_negative(&self) {
        self.post(json!({"trigger_recommendation": false})).await;
    }

    async fn post(&self, payload: serde_json::Value) {
        match self.http.post(&self.url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "trigger endpoint answered non-2xx");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "trigger request failed"),
        }
    }
}
