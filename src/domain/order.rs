use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::item::Item;
use super::payment::PaymentStatus;
use super::user::User;
use validator::Validate;

use super::validation::Checked;

/// Lifecycle state of an order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    /// Status an order moves to once a payment outcome arrives.
    ///
    /// Only `NEW` orders react to payments. Replaying the outcome an order
    /// already reflects returns the current status unchanged, so redelivered
    /// events are harmless. `None` means the transition is not allowed.
    pub fn after_payment(self, outcome: PaymentStatus) -> Option<OrderStatus> {
        let target = match outcome {
            PaymentStatus::Success => OrderStatus::Paid,
            PaymentStatus::Failed => OrderStatus::Cancelled,
        };

        if self == target || self == OrderStatus::New {
            Some(target)
        } else {
            None
        }
    }
}

/// A purchase record owned by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub creation_date: DateTime<Utc>,
}

/// One line of an order: an item and how many of it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
}

/// Checked order line, ready to be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLine {
    pub item_id: Uuid,
    pub quantity: i32,
}

impl NewOrderLine {
    pub fn new(item_id: Uuid, quantity: i32) -> Self {
        Self { item_id, quantity }
    }
}

/// Selects orders by any combination of status, owner and ids.
///
/// `ids: Some(vec![])` matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
    pub ids: Option<Vec<Uuid>>,
}

impl OrderFilter {
    pub fn by_status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn by_ids(ids: Vec<Uuid>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn by_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: Option<OrderStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| s == order.status)
            && self.user_id.map_or(true, |u| u == order.user_id)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&order.id))
    }
}

// -----------------------------------------------------------------------------
// Incoming payloads
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    #[serde(default)]
    #[validate(required(message = "Item id must be provided"))]
    pub item_id: Option<Uuid>,
    #[serde(default)]
    #[validate(
        required(message = "Quantity must be provided"),
        range(min = 1, message = "Quantity must be at least 1")
    )]
    pub quantity: Option<i32>,
}

/// Order payload used by administrators.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    #[serde(default)]
    #[validate(required(message = "User id must be provided"))]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    #[validate(
        required(message = "Order must contain at least one item"),
        length(min = 1, message = "Order must contain at least one item"),
        nested
    )]
    pub order_items: Option<Vec<OrderLineInput>>,
}

/// Order payload used by a caller acting on their own orders.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserOrderInput {
    #[serde(default)]
    #[validate(
        required(message = "Order must contain at least one item"),
        length(min = 1, message = "Order must contain at least one item"),
        nested
    )]
    pub order_items: Option<Vec<OrderLineInput>>,
}

/// Checked administrator payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub status: Option<OrderStatus>,
    pub lines: Vec<NewOrderLine>,
}

impl Checked for OrderInput {
    type Output = OrderDraft;

    fn into_output(self) -> Option<OrderDraft> {
        Some(OrderDraft {
            user_id: self.user_id?,
            status: self.status,
            lines: into_lines(self.order_items?)?,
        })
    }
}

impl Checked for UserOrderInput {
    type Output = Vec<NewOrderLine>;

    fn into_output(self) -> Option<Vec<NewOrderLine>> {
        into_lines(self.order_items?)
    }
}

fn into_lines(inputs: Vec<OrderLineInput>) -> Option<Vec<NewOrderLine>> {
    inputs
        .into_iter()
        .map(|line| Some(NewOrderLine::new(line.item_id?, line.quantity?)))
        .collect()
}

/// Distinct item ids of the given lines, or the first repeated id.
pub fn distinct_item_ids(lines: &[NewOrderLine]) -> Result<Vec<Uuid>, Uuid> {
    let mut seen = HashSet::with_capacity(lines.len());
    let mut ids = Vec::with_capacity(lines.len());
    for line in lines {
        if !seen.insert(line.item_id) {
            return Err(line.item_id);
        }
        ids.push(line.item_id);
    }
    Ok(ids)
}

// -----------------------------------------------------------------------------
// Outgoing views
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: Uuid,
    pub item: Option<Item>,
    pub quantity: i32,
}

/// An order joined with its lines, their items and the owning user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub user: Option<User>,
    pub status: OrderStatus,
    pub creation_date: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
    pub total: Decimal,
}

impl OrderItemView {
    pub fn new(line: &OrderLine, items: &HashMap<Uuid, Item>) -> Self {
        Self {
            id: line.id,
            item: items.get(&line.item_id).cloned(),
            quantity: line.quantity,
        }
    }
}

impl OrderView {
    pub fn compose(
        order: Order,
        lines: &[OrderLine],
        items: &HashMap<Uuid, Item>,
        user: Option<User>,
    ) -> Self {
        Self {
            id: order.id,
            user,
            status: order.status,
            creation_date: order.creation_date,
            items: lines.iter().map(|l| OrderItemView::new(l, items)).collect(),
            total: order_total(lines, items),
        }
    }
}

/// Sum of `price * quantity`; lines whose item is unknown contribute nothing.
pub fn order_total(lines: &[OrderLine], items: &HashMap<Uuid, Item>) -> Decimal {
    lines
        .iter()
        .filter_map(|line| {
            items
                .get(&line.item_id)
                .map(|item| item.price * Decimal::from(line.quantity))
        })
        .sum()
}
