use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::actors::{ItemService, OrderService};
use crate::bus::{Publisher, Subscriber};
use crate::clients::{ItemClient, OrderClient, UserDirectory};
use crate::payments::PaymentListener;
use crate::store::{ItemStore, OrderStore};

/// Everything the actors talk to outside the process.
pub struct Backends {
    pub item_store: Arc<dyn ItemStore>,
    pub order_store: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserDirectory>,
    pub publisher: Arc<dyn Publisher>,
    pub payments: Box<dyn Subscriber>,
}

/// Running actor system: the item and order actors plus the payment listener.
pub struct OrderSystem {
    pub item_client: ItemClient,
    pub order_client: OrderClient,
    listener_shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl OrderSystem {
    /// Starts the sub-actor first, then the root actor wired to it, then the
    /// payment listener feeding the root actor.
    #[instrument(name = "order_system", skip(backends, order_topic))]
    pub fn start(mailbox_size: usize, order_topic: impl Into<String>, backends: Backends) -> Self {
        let mut handles = Vec::new();

        info!("Starting order system");

        let (item_service, item_client) = ItemService::new(mailbox_size, backends.item_store);
        handles.push(tokio::spawn(item_service.run()));

        let (order_service, order_client) = OrderService::new(
            mailbox_size,
            backends.order_store,
            item_client.clone(),
            backends.users,
            backends.publisher,
            order_topic,
        );
        handles.push(tokio::spawn(order_service.run()));

        let listener_shutdown = CancellationToken::new();
        let listener = PaymentListener::new(backends.payments, order_client.clone());
        handles.push(tokio::spawn(listener.run(listener_shutdown.clone())));

        info!("Order system started successfully");

        Self {
            item_client,
            order_client,
            listener_shutdown,
            handles,
        }
    }

    /// Stops the payment listener, then the root actor, then the item actor,
    /// and waits for all of them.
    #[instrument(skip(self))]
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down order system");

        self.listener_shutdown.cancel();
        let _ = self.order_client.shutdown().await;
        let _ = self.item_client.shutdown().await;

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = ?e, "Service shutdown error");
            }
        }

        info!("Order system shutdown complete");
        Ok(())
    }
}
