use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bus::{Event, Publisher};
use crate::clients::{ItemClient, OrderClient, UserDirectory};
use crate::domain::{
    distinct_item_ids, Item, NewOrderLine, Order, OrderCreatedEvent, OrderDraft, OrderFilter,
    OrderItemView, OrderLine, OrderStatus, OrderView, PaymentStatus, User,
};
use crate::error::{OrderError, StoreError};
use crate::messages::{OrderRequest, ServiceResponse};
use crate::store::OrderStore;

/// Macro for clean error response handling
macro_rules! send_error {
    ($respond_to:expr, $error:expr) => {{
        let _ = $respond_to.send(Err($error));
        return;
    }};
}

/// Root actor for orders.
///
/// Composes every order answer from three sources: order rows from the store,
/// items from the [`ItemService`](super::ItemService) and the owner from the
/// user service. Requests are handled one at a time, so a payment outcome and
/// an edit of the same order never interleave.
pub struct OrderService {
    receiver: mpsc::Receiver<OrderRequest>,
    store: Arc<dyn OrderStore>,
    items: ItemClient,
    users: Arc<dyn UserDirectory>,
    publisher: Arc<dyn Publisher>,
    order_topic: String,
}

impl OrderService {
    pub fn new(
        buffer_size: usize,
        store: Arc<dyn OrderStore>,
        items: ItemClient,
        users: Arc<dyn UserDirectory>,
        publisher: Arc<dyn Publisher>,
        order_topic: impl Into<String>,
    ) -> (Self, OrderClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let service = Self {
            receiver,
            store,
            items,
            users,
            publisher,
            order_topic: order_topic.into(),
        };
        (service, OrderClient::new(sender))
    }

    #[instrument(name = "order_service", skip(self))]
    pub async fn run(mut self) {
        info!("OrderService starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                OrderRequest::GetOrder {
                    id,
                    owner,
                    respond_to,
                } => {
                    self.handle_get_order(id, owner, respond_to).await;
                }
                OrderRequest::ListOrders { filter, respond_to } => {
                    self.handle_list_orders(filter, respond_to).await;
                }
                OrderRequest::CreateOrder {
                    user_id,
                    lines,
                    respond_to,
                } => {
                    self.handle_create_order(user_id, lines, respond_to).await;
                }
                OrderRequest::UpdateOrder {
                    id,
                    owner,
                    draft,
                    respond_to,
                } => {
                    self.handle_update_order(id, owner, draft, respond_to).await;
                }
                OrderRequest::DeleteOrder {
                    id,
                    owner,
                    respond_to,
                } => {
                    self.handle_delete_order(id, owner, respond_to).await;
                }
                OrderRequest::ApplyPayment {
                    order_id,
                    payment_status,
                    respond_to,
                } => {
                    self.handle_apply_payment(order_id, payment_status, respond_to)
                        .await;
                }
                OrderRequest::GetOrderItem { id, respond_to } => {
                    self.handle_get_order_item(id, respond_to).await;
                }
                OrderRequest::GetOrderItemFor {
                    order_id,
                    item_id,
                    respond_to,
                } => {
                    self.handle_get_order_item_for(order_id, item_id, respond_to)
                        .await;
                }
                OrderRequest::OrderItemsForOrder {
                    order_id,
                    respond_to,
                } => {
                    self.handle_order_items_for_order(order_id, respond_to).await;
                }
                OrderRequest::OrderItemsForItem {
                    item_id,
                    respond_to,
                } => {
                    self.handle_order_items_for_item(item_id, respond_to).await;
                }
                OrderRequest::DeleteOrderItem { id, respond_to } => {
                    self.handle_delete_order_item(id, respond_to).await;
                }
                OrderRequest::Shutdown => {
                    info!("OrderService shutting down");
                    break;
                }
            }
        }

        info!("OrderService stopped");
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(fields(order_id = %id, owner = ?owner), skip(self, respond_to))]
    async fn handle_get_order(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        respond_to: ServiceResponse<OrderView, OrderError>,
    ) {
        debug!("Processing get_order request");

        let result: Result<OrderView, OrderError> = async {
            let order = self.owned_order(id, owner).await?;
            let lines = self.store.lines_for_orders(&[order.id]).await?;
            let items = self.items_for(&lines).await?;
            let user = self.users.get_user(order.user_id).await?;
            Ok(OrderView::compose(order, &lines, &items, Some(user)))
        }
        .await;

        if let Err(e) = &result {
            debug!(error = %e, "Order lookup failed");
        }
        let _ = respond_to.send(result);
    }

    #[instrument(skip(self, respond_to))]
    async fn handle_list_orders(
        &self,
        filter: OrderFilter,
        respond_to: ServiceResponse<Vec<OrderView>, OrderError>,
    ) {
        debug!("Processing list_orders request");

        let result: Result<Vec<OrderView>, OrderError> = async {
            let orders = self.store.find(&filter).await?;
            self.compose_all(orders).await
        }
        .await;

        match &result {
            Ok(views) => info!(order_count = views.len(), "Listed orders"),
            Err(e) => warn!(error = %e, "Listing orders failed"),
        }
        let _ = respond_to.send(result);
    }

    #[instrument(fields(user_id = %user_id, line_count = lines.len()), skip(self, lines, respond_to))]
    async fn handle_create_order(
        &self,
        user_id: Uuid,
        lines: Vec<NewOrderLine>,
        respond_to: ServiceResponse<OrderView, OrderError>,
    ) {
        info!("Processing create_order request");

        // Step 1: Resolve the owner before anything is written
        let user = match self.users.get_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "User lookup failed");
                send_error!(respond_to, e.into());
            }
        };

        // Step 2: Check the lines against the catalog
        let items = match self.checked_items(&lines).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Order lines rejected");
                send_error!(respond_to, e);
            }
        };

        // Step 3: Persist order and lines together
        let (order, stored) = match self.store.create(user_id, OrderStatus::New, &lines).await {
            Ok(created) => created,
            Err(e) => {
                error!(error = %e, "Order insert failed");
                send_error!(respond_to, self.explain_write_failure(&lines, e).await);
            }
        };
        let view = OrderView::compose(order, &stored, &items, Some(user));
        info!(order_id = %view.id, total = %view.total, "Order created successfully");

        // Step 4: Announce the order; the stored order stands even if this fails
        self.publish_created(&view, user_id).await;

        let _ = respond_to.send(Ok(view));
    }

    #[instrument(
        fields(order_id = %id, owner = ?owner, user_id = %draft.user_id, line_count = draft.lines.len()),
        skip(self, draft, respond_to)
    )]
    async fn handle_update_order(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        draft: OrderDraft,
        respond_to: ServiceResponse<OrderView, OrderError>,
    ) {
        info!("Processing update_order request");

        let result: Result<OrderView, OrderError> = async {
            let user = self.users.get_user(draft.user_id).await?;
            let existing = self.owned_order(id, owner).await?;
            let items = self.checked_items(&draft.lines).await?;

            let status = draft.status.unwrap_or(existing.status);
            let written = match self.store.update(id, draft.user_id, status, &draft.lines).await {
                Ok(written) => written,
                Err(e) => return Err(self.explain_write_failure(&draft.lines, e).await),
            };
            let (order, stored) = written.ok_or(OrderError::NotFound(id))?;
            Ok(OrderView::compose(order, &stored, &items, Some(user)))
        }
        .await;

        match &result {
            Ok(view) => info!(status = %view.status, total = %view.total, "Order updated successfully"),
            Err(e) => warn!(error = %e, "Order update failed"),
        }
        let _ = respond_to.send(result);
    }

    #[instrument(fields(order_id = %id, owner = ?owner), skip(self, respond_to))]
    async fn handle_delete_order(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        respond_to: ServiceResponse<(), OrderError>,
    ) {
        debug!("Processing delete_order request");

        let result = match self.store.delete(id, owner).await {
            Ok(deleted) => {
                info!(deleted, "Order delete handled");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
        let _ = respond_to.send(result);
    }

    #[instrument(fields(order_id = %order_id, payment_status = ?payment_status), skip(self, respond_to))]
    async fn handle_apply_payment(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
        respond_to: ServiceResponse<OrderStatus, OrderError>,
    ) {
        info!("Processing apply_payment request");

        let order = match self.store.find_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!("Order not found for payment");
                send_error!(respond_to, OrderError::NotFound(order_id));
            }
            Err(e) => send_error!(respond_to, e.into()),
        };

        let Some(next) = order.status.after_payment(payment_status) else {
            warn!(status = %order.status, "Payment outcome does not apply to order");
            send_error!(
                respond_to,
                OrderError::InvalidTransition {
                    id: order_id,
                    status: order.status,
                    outcome: payment_status,
                }
            );
        };

        if next == order.status {
            debug!(status = %next, "Payment outcome already applied");
            let _ = respond_to.send(Ok(next));
            return;
        }

        let result = match self.store.update_status(order_id, next).await {
            Ok(Some(updated)) => {
                info!(from = %order.status, to = %updated.status, "Order status changed");
                Ok(updated.status)
            }
            Ok(None) => Err(OrderError::NotFound(order_id)),
            Err(e) => Err(e.into()),
        };
        let _ = respond_to.send(result);
    }

    // -------------------------------------------------------------------------
    // Order-items
    // -------------------------------------------------------------------------

    #[instrument(fields(order_item_id = %id), skip(self, respond_to))]
    async fn handle_get_order_item(
        &self,
        id: Uuid,
        respond_to: ServiceResponse<OrderItemView, OrderError>,
    ) {
        debug!("Processing get_order_item request");

        let result: Result<OrderItemView, OrderError> = async {
            let line = self
                .store
                .find_line(id)
                .await?
                .ok_or(OrderError::OrderItemNotFound)?;
            self.line_view(&line).await
        }
        .await;
        let _ = respond_to.send(result);
    }

    #[instrument(fields(order_id = %order_id, item_id = %item_id), skip(self, respond_to))]
    async fn handle_get_order_item_for(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        respond_to: ServiceResponse<OrderItemView, OrderError>,
    ) {
        debug!("Processing get_order_item_for request");

        let result: Result<OrderItemView, OrderError> = async {
            let line = self
                .store
                .find_line_by_order_and_item(order_id, item_id)
                .await?
                .ok_or(OrderError::OrderItemNotFound)?;
            self.line_view(&line).await
        }
        .await;
        let _ = respond_to.send(result);
    }

    #[instrument(fields(order_id = %order_id), skip(self, respond_to))]
    async fn handle_order_items_for_order(
        &self,
        order_id: Uuid,
        respond_to: ServiceResponse<Vec<OrderItemView>, OrderError>,
    ) {
        debug!("Processing order_items_for_order request");

        let result: Result<Vec<OrderItemView>, OrderError> = async {
            let lines = self.store.lines_for_orders(&[order_id]).await?;
            self.line_views(&lines).await
        }
        .await;
        let _ = respond_to.send(result);
    }

    #[instrument(fields(item_id = %item_id), skip(self, respond_to))]
    async fn handle_order_items_for_item(
        &self,
        item_id: Uuid,
        respond_to: ServiceResponse<Vec<OrderItemView>, OrderError>,
    ) {
        debug!("Processing order_items_for_item request");

        let result: Result<Vec<OrderItemView>, OrderError> = async {
            let lines = self.store.lines_for_item(item_id).await?;
            self.line_views(&lines).await
        }
        .await;
        let _ = respond_to.send(result);
    }

    #[instrument(fields(order_item_id = %id), skip(self, respond_to))]
    async fn handle_delete_order_item(&self, id: Uuid, respond_to: ServiceResponse<(), OrderError>) {
        debug!("Processing delete_order_item request");

        let result = match self.store.delete_line(id).await {
            Ok(deleted) => {
                info!(deleted, "Order-item delete handled");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
        let _ = respond_to.send(result);
    }

    // -------------------------------------------------------------------------
    // Composition helpers
    // -------------------------------------------------------------------------

    async fn owned_order(&self, id: Uuid, owner: Option<Uuid>) -> Result<Order, OrderError> {
        self.store
            .find_by_id(id)
            .await?
            .filter(|order| owner.map_or(true, |user_id| order.user_id == user_id))
            .ok_or(OrderError::NotFound(id))
    }

    /// Items referenced by `lines`, fetched in one batch.
    async fn items_for(&self, lines: &[OrderLine]) -> Result<HashMap<Uuid, Item>, OrderError> {
        let ids: Vec<Uuid> = lines
            .iter()
            .map(|l| l.item_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let items = self.items.get_items(ids).await?;
        Ok(items.into_iter().map(|item| (item.id, item)).collect())
    }

    /// Rejects empty orders, repeated items and unknown items.
    async fn checked_items(&self, lines: &[NewOrderLine]) -> Result<HashMap<Uuid, Item>, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        let ids = distinct_item_ids(lines).map_err(OrderError::DuplicateItem)?;
        let items: HashMap<Uuid, Item> = self
            .items
            .get_items(ids.clone())
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let missing: Vec<Uuid> = ids.into_iter().filter(|id| !items.contains_key(id)).collect();
        if !missing.is_empty() {
            return Err(OrderError::MissingItems(missing));
        }
        Ok(items)
    }

    /// A constraint violation on write after the lines were checked means an
    /// item was deleted in between; report it as missing.
    async fn explain_write_failure(&self, lines: &[NewOrderLine], err: StoreError) -> OrderError {
        if !matches!(err, StoreError::Conflict(_)) {
            return err.into();
        }
        let ids: Vec<Uuid> = lines.iter().map(|line| line.item_id).collect();
        match self.items.get_items(ids.clone()).await {
            Ok(found) => {
                let missing: Vec<Uuid> = ids
                    .into_iter()
                    .filter(|id| !found.iter().any(|item| item.id == *id))
                    .collect();
                if missing.is_empty() {
                    err.into()
                } else {
                    warn!(?missing, "Items vanished before the order was written");
                    OrderError::MissingItems(missing)
                }
            }
            Err(_) => err.into(),
        }
    }

    /// Views for many orders with one line query, one item batch and one user batch.
    async fn compose_all(&self, orders: Vec<Order>) -> Result<Vec<OrderView>, OrderError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let lines = self.store.lines_for_orders(&order_ids).await?;
        let items = self.items_for(&lines).await?;

        let mut lines_by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for line in lines {
            lines_by_order.entry(line.order_id).or_default().push(line);
        }

        let user_ids: Vec<Uuid> = orders
            .iter()
            .map(|o| o.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users: HashMap<Uuid, User> = self
            .users
            .get_users(&user_ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        Ok(orders
            .into_iter()
            .map(|order| {
                let lines = lines_by_order.remove(&order.id).unwrap_or_default();
                let user = users.get(&order.user_id).cloned();
                OrderView::compose(order, &lines, &items, user)
            })
            .collect())
    }

    async fn line_view(&self, line: &OrderLine) -> Result<OrderItemView, OrderError> {
        let items = self.items_for(std::slice::from_ref(line)).await?;
        Ok(OrderItemView::new(line, &items))
    }

    async fn line_views(&self, lines: &[OrderLine]) -> Result<Vec<OrderItemView>, OrderError> {
        let items = self.items_for(lines).await?;
        Ok(lines.iter().map(|line| OrderItemView::new(line, &items)).collect())
    }

    async fn publish_created(&self, view: &OrderView, user_id: Uuid) {
        let payload = OrderCreatedEvent {
            order_id: view.id,
            user_id,
            total: view.total,
        };
        let published = match Event::json(&self.order_topic, Some(view.id.to_string()), &payload) {
            Ok(event) => self.publisher.publish(event).await,
            Err(e) => Err(e),
        };
        match published {
            Ok(()) => debug!(topic = %self.order_topic, "OrderCreated published"),
            Err(e) => error!(error = %e, topic = %self.order_topic, "Failed to publish OrderCreated"),
        }
    }
}
