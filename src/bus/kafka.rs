use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Message;
use tracing::{debug, info, instrument, warn};

use super::{Event, Publisher, Subscriber};
use crate::error::BusError;

const EVENT_ID_HEADER: &str = "event-id";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(brokers: &str) -> Result<Self, BusError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BusError::Publish(e.to_string()))?;
        info!(brokers, "Kafka producer created");
        Ok(Self { producer })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    #[instrument(skip(self, event), fields(topic = %event.topic, event_id = %event.id))]
    async fn publish(&self, event: Event) -> Result<(), BusError> {
        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_ID_HEADER,
            value: Some(event.id.as_str()),
        });
        let mut record = FutureRecord::<str, [u8]>::to(&event.topic)
            .payload(&event.payload[..])
            .headers(headers);
        if let Some(key) = &event.key {
            record = record.key(key.as_str());
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| BusError::Publish(e.to_string()))?;
        debug!(partition, offset, "Event delivered");
        Ok(())
    }
}

/// Position of the last delivered event, kept until it is acknowledged.
#[derive(Debug, Clone, PartialEq)]
struct InFlight {
    event_id: String,
    topic: String,
    partition: i32,
    offset: i64,
}

impl InFlight {
    /// Kafka commits the offset of the next message to consume.
    fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// Takes the in-flight position if it belongs to `event_id`.
fn take_in_flight(slot: &mut Option<InFlight>, event_id: &str) -> Option<InFlight> {
    match slot {
        Some(in_flight) if in_flight.event_id == event_id => slot.take(),
        _ => None,
    }
}

/// Consumer-group member of one topic. Offsets are stored only on [`Subscriber::ack`],
/// so an unacknowledged event is redelivered after a restart.
///
/// Only the most recently delivered event is tracked; callers settle each
/// event before receiving the next one.
pub struct KafkaSubscriber {
    consumer: StreamConsumer,
    in_flight: Option<InFlight>,
}

impl KafkaSubscriber {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BusError::Receive(e.to_string()))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Receive(e.to_string()))?;
        info!(brokers, group_id, topic, "Kafka consumer subscribed");
        Ok(Self {
            consumer,
            in_flight: None,
        })
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn recv(&mut self) -> Result<Event, BusError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Receive(e.to_string()))?;

        let topic = message.topic().to_string();
        let (partition, offset) = (message.partition(), message.offset());
        let id = message
            .headers()
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|h| h.key == EVENT_ID_HEADER)
                    .and_then(|h| h.value)
                    .map(|v| String::from_utf8_lossy(v).into_owned())
            })
            .unwrap_or_else(|| format!("{topic}/{partition}/{offset}"));
        let event = Event {
            id,
            topic: topic.clone(),
            key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().unwrap_or_default().to_vec(),
        };

        if let Some(previous) = self.in_flight.replace(InFlight {
            event_id: event.id.clone(),
            topic,
            partition,
            offset,
        }) {
            warn!(event_id = %previous.event_id, "Event was never acknowledged");
        }
        Ok(event)
    }

    async fn ack(&mut self, event: &Event) -> Result<(), BusError> {
        let Some(in_flight) = take_in_flight(&mut self.in_flight, &event.id) else {
            warn!(event_id = %event.id, "Ack for an event that is not in flight");
            return Ok(());
        };
        self.consumer
            .store_offset(&in_flight.topic, in_flight.partition, in_flight.next_offset())
            .map_err(|e| BusError::Receive(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_flight(event_id: &str, offset: i64) -> InFlight {
        InFlight {
            event_id: event_id.to_string(),
            topic: "create-payment".to_string(),
            partition: 0,
            offset,
        }
    }

    #[test]
    fn acknowledged_offset_points_past_the_event() {
        assert_eq!(in_flight("a", 0).next_offset(), 1);
        assert_eq!(in_flight("a", 41).next_offset(), 42);
    }

    #[test]
    fn only_the_delivered_event_can_be_taken() {
        let mut slot = Some(in_flight("a", 7));
        assert_eq!(take_in_flight(&mut slot, "b"), None);
        assert!(slot.is_some());

        assert_eq!(take_in_flight(&mut slot, "a"), Some(in_flight("a", 7)));
        assert_eq!(slot, None);
        assert_eq!(take_in_flight(&mut slot, "a"), None);
    }
}
