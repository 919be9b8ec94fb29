use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ItemStore, OrderStore, StoreResult};
use crate::domain::{Item, NewItem, NewOrderLine, Order, OrderFilter, OrderLine, OrderStatus};
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    items: HashMap<Uuid, Item>,
    orders: HashMap<Uuid, Order>,
    // insertion order doubles as the line sequence
    lines: Vec<OrderLine>,
}

impl Tables {
    fn check_lines(&self, lines: &[NewOrderLine]) -> StoreResult<()> {
        for (index, line) in lines.iter().enumerate() {
            if !self.items.contains_key(&line.item_id) {
                return Err(StoreError::Conflict(format!(
                    "item {} does not exist",
                    line.item_id
                )));
            }
            if lines[..index].iter().any(|l| l.item_id == line.item_id) {
                return Err(StoreError::Conflict(format!(
                    "item {} appears twice in one order",
                    line.item_id
                )));
            }
            if line.quantity < 1 {
                return Err(StoreError::Conflict(format!(
                    "quantity {} is not positive",
                    line.quantity
                )));
            }
        }
        Ok(())
    }

    fn insert_lines(&mut self, order_id: Uuid, lines: &[NewOrderLine]) -> Vec<OrderLine> {
        let created: Vec<OrderLine> = lines
            .iter()
            .map(|line| OrderLine {
                id: Uuid::new_v4(),
                order_id,
                item_id: line.item_id,
                quantity: line.quantity,
            })
            .collect();
        self.lines.extend(created.iter().cloned());
        created
    }
}

/// Store keeping every table in process memory.
///
/// Enforces the same constraints as the SQL schema: lines must point at
/// existing items, an item appears at most once per order, and referenced
/// items cannot be deleted.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn find_all(&self) -> StoreResult<Vec<Item>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Item> = tables.items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Item>> {
        Ok(self.tables.read().await.items.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Item>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.items.get(id).cloned()).collect())
    }

    async fn create(&self, item: NewItem) -> StoreResult<Item> {
        let item = Item {
            id: Uuid::new_v4(),
            name: item.name,
            price: item.price,
        };
        self.tables.write().await.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update(&self, id: Uuid, item: NewItem) -> StoreResult<Option<Item>> {
        let mut tables = self.tables.write().await;
        Ok(tables.items.get_mut(&id).map(|existing| {
            existing.name = item.name;
            existing.price = item.price;
            existing.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.lines.iter().any(|line| line.item_id == id) {
            return Err(StoreError::Conflict(format!(
                "item {id} is referenced by order items"
            )));
        }
        Ok(tables.items.remove(&id).is_some())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by_key(|order| (order.creation_date, order.id));
        Ok(orders)
    }

    async fn create(
        &self,
        user_id: Uuid,
        status: OrderStatus,
        lines: &[NewOrderLine],
    ) -> StoreResult<(Order, Vec<OrderLine>)> {
        let mut tables = self.tables.write().await;
        tables.check_lines(lines)?;

        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            status,
            creation_date: Utc::now(),
        };
        tables.orders.insert(order.id, order.clone());
        let lines = tables.insert_lines(order.id, lines);
        Ok((order, lines))
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        status: OrderStatus,
        lines: &[NewOrderLine],
    ) -> StoreResult<Option<(Order, Vec<OrderLine>)>> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&id) {
            return Ok(None);
        }
        tables.check_lines(lines)?;

        let order = match tables.orders.get_mut(&id) {
            Some(order) => {
                order.user_id = user_id;
                order.status = status;
                order.clone()
            }
            None => return Ok(None),
        };
        tables.lines.retain(|line| line.order_id != id);
        let lines = tables.insert_lines(id, lines);
        Ok(Some((order, lines)))
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        Ok(tables.orders.get_mut(&id).map(|order| {
            order.status = status;
            order.clone()
        }))
    }

    async fn delete(&self, id: Uuid, owner: Option<Uuid>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = match (tables.orders.get(&id), owner) {
            (Some(order), Some(user_id)) => order.user_id == user_id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !owned {
            return Ok(false);
        }
        tables.orders.remove(&id);
        tables.lines.retain(|line| line.order_id != id);
        Ok(true)
    }

    async fn lines_for_orders(&self, order_ids: &[Uuid]) -> StoreResult<Vec<OrderLine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lines
            .iter()
            .filter(|line| order_ids.contains(&line.order_id))
            .cloned()
            .collect())
    }

    async fn find_line(&self, id: Uuid) -> StoreResult<Option<OrderLine>> {
        let tables = self.tables.read().await;
        Ok(tables.lines.iter().find(|line| line.id == id).cloned())
    }

    async fn find_line_by_order_and_item(
        &self,
        order_id: Uuid,
        item_id: Uuid,
    ) -> StoreResult<Option<OrderLine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lines
            .iter()
            .find(|line| line.order_id == order_id && line.item_id == item_id)
            .cloned())
    }

    async fn lines_for_item(&self, item_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lines
            .iter()
            .filter(|line| line.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn delete_line(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.lines.len();
        tables.lines.retain(|line| line.id != id);
        Ok(tables.lines.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    async fn seeded() -> (InMemoryStore, Item, Item) {
        let store = InMemoryStore::new();
        let pen = ItemStore::create(&store, NewItem::new("Pen", Decimal::new(150, 2)))
            .await
            .unwrap();
        let ink = ItemStore::create(&store, NewItem::new("Ink", Decimal::new(700, 2)))
            .await
            .unwrap();
        (store, pen, ink)
    }

    #[tokio::test]
    async fn create_keeps_lines_in_insertion_order() {
        let (store, pen, ink) = seeded().await;
        let user = Uuid::new_v4();

        let (order, lines) = OrderStore::create(
            &store,
            user,
            OrderStatus::New,
            &[NewOrderLine::new(ink.id, 1), NewOrderLine::new(pen.id, 3)],
        )
        .await
        .unwrap();

        let stored = store.lines_for_orders(&[order.id]).await.unwrap();
        assert_eq!(stored, lines);
        assert_eq!(stored[0].item_id, ink.id);
        assert_eq!(stored[1].quantity, 3);
    }

    #[tokio::test]
    async fn create_rejects_unknown_item_without_writing() {
        let (store, pen, _) = seeded().await;

        let result = OrderStore::create(
            &store,
            Uuid::new_v4(),
            OrderStatus::New,
            &[NewOrderLine::new(pen.id, 1), NewOrderLine::new(Uuid::new_v4(), 1)],
        )
        .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.find(&OrderFilter::default()).await.unwrap().is_empty());
        assert!(store.lines_for_item(pen.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_every_line() {
        let (store, pen, ink) = seeded().await;
        let user = Uuid::new_v4();
        let (order, _) = OrderStore::create(&store, user, OrderStatus::New, &[NewOrderLine::new(pen.id, 1)])
            .await
            .unwrap();

        let (updated, lines) = OrderStore::update(
            &store,
            order.id,
            user,
            OrderStatus::Shipped,
            &[NewOrderLine::new(ink.id, 2)],
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(lines.len(), 1);
        assert!(store.lines_for_item(pen.id).await.unwrap().is_empty());
        assert!(OrderStore::update(&store, Uuid::new_v4(), user, OrderStatus::New, &[])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn referenced_item_cannot_be_deleted() {
        let (store, pen, ink) = seeded().await;
        OrderStore::create(&store, Uuid::new_v4(), OrderStatus::New, &[NewOrderLine::new(pen.id, 1)])
            .await
            .unwrap();

        assert!(matches!(
            ItemStore::delete(&store, pen.id).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(ItemStore::delete(&store, ink.id).await.unwrap());
        assert!(!ItemStore::delete(&store, ink.id).await.unwrap());
    }

    #[tokio::test]
    async fn owner_scoped_delete_leaves_foreign_orders() {
        let (store, pen, _) = seeded().await;
        let owner = Uuid::new_v4();
        let (order, _) = OrderStore::create(&store, owner, OrderStatus::New, &[NewOrderLine::new(pen.id, 1)])
            .await
            .unwrap();

        assert!(!OrderStore::delete(&store, order.id, Some(Uuid::new_v4())).await.unwrap());
        assert!(OrderStore::delete(&store, order.id, Some(owner)).await.unwrap());
        assert!(store.lines_for_item(pen.id).await.unwrap().is_empty());
    }
}
