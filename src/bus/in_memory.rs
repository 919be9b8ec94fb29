use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, instrument};

use super::{Event, Publisher, Subscriber};
use crate::error::BusError;

#[derive(Default)]
struct Log {
    events: RwLock<Vec<Event>>,
    appended: Notify,
}

/// In-process bus backed by one shared append-only log.
///
/// Every subscriber keeps its own read position and sees each event of its
/// topic published after it subscribed.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    log: Arc<Log>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: impl Into<String>) -> InMemorySubscriber {
        let position = self.log.events.read().await.len();
        InMemorySubscriber {
            log: self.log.clone(),
            topic: topic.into(),
            position,
        }
    }

    /// Every event published on `topic` so far.
    pub async fn events(&self, topic: &str) -> Vec<Event> {
        self.log
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    #[instrument(skip(self, event), fields(topic = %event.topic, event_id = %event.id))]
    async fn publish(&self, event: Event) -> Result<(), BusError> {
        self.log.events.write().await.push(event);
        self.log.appended.notify_waiters();
        debug!("Event appended");
        Ok(())
    }
}

pub struct InMemorySubscriber {
    log: Arc<Log>,
    topic: String,
    position: usize,
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    async fn recv(&mut self) -> Result<Event, BusError> {
        loop {
            // Registered before reading so an append in between still wakes us.
            let appended = self.log.appended.notified();
            {
                let events = self.log.events.read().await;
                while self.position < events.len() {
                    let event = &events[self.position];
                    self.position += 1;
                    if event.topic == self.topic {
                        return Ok(event.clone());
                    }
                }
            }
            appended.await;
        }
    }

    /// The read position already moved past `event`; nothing is redelivered.
    async fn ack(&mut self, event: &Event) -> Result<(), BusError> {
        debug!(event_id = %event.id, "Event acknowledged");
        Ok(())
    }
}
