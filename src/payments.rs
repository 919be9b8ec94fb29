use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::bus::{Event, Subscriber};
use crate::clients::OrderClient;
use crate::domain::PaymentCreatedEvent;
use crate::error::{OrderError, StoreError};

const FIRST_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Feeds payment outcomes from the bus into the order actor.
pub struct PaymentListener {
    subscriber: Box<dyn Subscriber>,
    orders: OrderClient,
}

/// What to do with an event once it was handled.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Ack,
    Retry,
}

impl PaymentListener {
    pub fn new(subscriber: Box<dyn Subscriber>, orders: OrderClient) -> Self {
        Self { subscriber, orders }
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Events are settled one at a time: an event that has to be retried is
    /// handled again, with a growing delay, before the next one is received.
    #[instrument(name = "payment_listener", skip_all)]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("PaymentListener starting");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.subscriber.recv() => received,
            };

            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "Receiving payment event failed");
                    continue;
                }
            };

            if !self.settle(&event, &shutdown).await {
                break;
            }
        }

        info!("PaymentListener stopped");
    }

    /// Handles `event` until it can be acknowledged; `false` if cancelled first.
    async fn settle(&mut self, event: &Event, shutdown: &CancellationToken) -> bool {
        let mut delay = FIRST_RETRY_DELAY;
        while self.handle(event).await == Disposition::Retry {
            warn!(event_id = %event.id, delay_ms = delay.as_millis() as u64, "Retrying payment event");
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }

        if let Err(e) = self.subscriber.ack(event).await {
            error!(error = %e, event_id = %event.id, "Acknowledging payment event failed");
        }
        true
    }

    #[instrument(fields(event_id = %event.id), skip(self, event))]
    async fn handle(&self, event: &Event) -> Disposition {
        let payment: PaymentCreatedEvent = match event.decode() {
            Ok(payment) => payment,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable payment event");
                return Disposition::Ack;
            }
        };

        debug!(order_id = %payment.order_id, payment_status = ?payment.payment_status, "Applying payment");
        match self
            .orders
            .apply_payment(payment.order_id, payment.payment_status)
            .await
        {
            Ok(status) => {
                info!(order_id = %payment.order_id, %status, "Payment applied");
                Disposition::Ack
            }
            Err(OrderError::ActorCommunication(reason)) => {
                error!(%reason, "Order actor unreachable, leaving payment event unacknowledged");
                Disposition::Retry
            }
            Err(OrderError::Store(StoreError::Database(reason))) => {
                error!(%reason, "Order store unavailable, leaving payment event unacknowledged");
                Disposition::Retry
            }
            Err(e) => {
                warn!(error = %e, order_id = %payment.order_id, "Payment event rejected");
                Disposition::Ack
            }
        }
    }
}
