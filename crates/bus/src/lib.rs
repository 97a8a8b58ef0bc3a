//! Typed publish/subscribe over Kafka. Envelopes are JSON; records are keyed
//! by `source_id` so that per-user ordering survives partitioning, and
//! offsets are committed only after the handler has returned (at-least-once).

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("envelope serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Producer side. One instance per process, cheap to clone.
#[derive(Clone)]
pub struct Publisher {
    producer: FutureProducer,
}

impl Publisher {
    pub fn connect(broker: &str) -> Result<Self, BusError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self { producer })
    }

    /// Serializes `payload` as JSON and publishes it keyed by `source_id`,
    /// waiting for the broker ack.
    pub async fn publish<T: Serialize>(
        &self,
        topic: &str,
        source_id: i64,
        payload: &T,
    ) -> Result<(), BusError> {
        let bytes = serde_json::to_vec(payload)?;
        let key = source_id.to_string();
        let record = FutureRecord::to(topic).key(&key).payload(&bytes);

        self.producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(err, _)| BusError::Kafka(err))?;

        debug!(topic, source_id, "envelope published");
        Ok(())
    }
}

/// A stage's message handler. The payload type is declared per topic; a
/// payload that does not decode as `Msg` is handed over as an opaque string
/// instead of killing the worker.
#[async_trait]
pub trait StageHandler: Send + Sync {
    type Msg: DeserializeOwned + Send;

    async fn handle(&self, msg: Self::Msg) -> anyhow::Result<()>;

    async fn on_undecodable(&self, topic: &str, raw: &str) {
        warn!(topic, raw, "payload did not decode, skipping");
    }
}

/// Consumer side. Owns one Kafka consumer; not shared between tasks.
pub struct Subscriber {
    consumer: StreamConsumer,
}

impl Subscriber {
    /// New consumer groups start from the earliest offset. Commits are
    /// manual so that an offset only advances once its handler returned.
    pub fn connect(broker: &str, group_id: &str) -> Result<Self, BusError> {
        let consumer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .create()?;
        Ok(Self { consumer })
    }

    /// Drives the consume loop. One message at a time: the next message on a
    /// partition is only polled after the previous handler returned. Handler
    /// errors are drops, not retries: the message is logged and its offset
    /// committed; redelivery only happens on process death.
    pub async fn run<H: StageHandler>(&self, topic: &str, handler: &H) -> Result<(), BusError> {
        self.consumer.subscribe(&[topic])?;

        loop {
            let message = self.consumer.recv().await?;
            let payload = message.payload().unwrap_or_default();

            match serde_json::from_slice::<H::Msg>(payload) {
                Ok(decoded) => {
                    if let Err(err) = handler.handle(decoded).await {
                        warn!(topic = message.topic(), error = %err, "handler dropped message");
                    }
                }
                Err(_) => {
                    let raw = String::from_utf8_lossy(payload);
                    handler.on_undecodable(message.topic(), &raw).await;
                }
            }

            self.consumer.commit_message(&message, CommitMode::Async)?;
        }
    }
}
