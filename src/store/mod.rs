//! Persistence seams for items, orders and order lines.
//!
//! Both traits have a PostgreSQL implementation ([`PgStore`]) and an in-memory
//! one ([`InMemoryStore`]) that enforces the same constraints as the schema.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Item, NewItem, NewOrderLine, Order, OrderFilter, OrderLine, OrderStatus};
use crate::error::StoreError;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn find_all(&self) -> StoreResult<Vec<Item>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Item>>;
    /// Unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Item>>;
    async fn create(&self, item: NewItem) -> StoreResult<Item>;
    async fn update(&self, id: Uuid, item: NewItem) -> StoreResult<Option<Item>>;
    /// Fails with [`StoreError::Conflict`] while order lines still point at the item.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn find(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Inserts the order and all of its lines atomically.
    async fn create(
        &self,
        user_id: Uuid,
        status: OrderStatus,
        lines: &[NewOrderLine],
    ) -> StoreResult<(Order, Vec<OrderLine>)>;

    /// Rewrites owner and status and replaces every line atomically.
    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        status: OrderStatus,
        lines: &[NewOrderLine],
    ) -> StoreResult<Option<(Order, Vec<OrderLine>)>>;

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>>;

    /// Removes the order with its lines. With an `owner`, only an order of that user.
    async fn delete(&self, id: Uuid, owner: Option<Uuid>) -> StoreResult<bool>;

    async fn lines_for_orders(&self, order_ids: &[Uuid]) -> StoreResult<Vec<OrderLine>>;
    async fn find_line(&self, id: Uuid) -> StoreResult<Option<OrderLine>>;
    async fn find_line_by_order_and_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
    ) -> StoreResult<Option<OrderLine>>;
    async fn lines_for_item(&self, item_id: Uuid) -> StoreResult<Vec<OrderLine>>;
    async fn delete_line(&self, id: Uuid) -> StoreResult<bool>;
}
