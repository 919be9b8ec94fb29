//! Event bus used to publish order events and receive payment outcomes.
//!
//! [`InMemoryBus`] keeps an append-only log per process and is what tests and
//! local runs use. With the `kafka` feature, [`kafka::KafkaPublisher`] and
//! [`kafka::KafkaSubscriber`] talk to a broker instead.

mod in_memory;
#[cfg(feature = "kafka")]
pub mod kafka;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BusError;

pub use in_memory::InMemoryBus;

/// A message on a topic. Payloads are JSON with camelCase field names.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub topic: String,
    /// Partitioning key; events about one order share it.
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl Event {
    pub fn new(topic: impl Into<String>, key: Option<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            key,
            payload,
        }
    }

    /// Serializes `payload` as JSON.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: Option<String>,
        payload: &T,
    ) -> Result<Self, BusError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| BusError::Encode(e.to_string()))?;
        Ok(Self::new(topic, key, bytes))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_slice(&self.payload).map_err(|e| BusError::Decode(e.to_string()))
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), BusError>;
}

/// Pull side of one topic subscription.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Waits for the next event.
    async fn recv(&mut self) -> Result<Event, BusError>;

    /// Marks `event` as handled so it is not delivered to this consumer group again.
    async fn ack(&mut self, event: &Event) -> Result<(), BusError>;
}
