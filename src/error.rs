use thiserror::Error;
use uuid::Uuid;

use crate::domain::{OrderStatus, PaymentStatus};

/// Failures of the persistence layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Constraint violated: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.is_foreign_key_violation() || db.is_unique_violation() =>
            {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Failures talking to the remote user service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UserServiceError {
    #[error("External service is unavailable")]
    Unavailable(String),
    #[error("User service answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Unreadable user service answer: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ItemError {
    #[error("Item not found: {0}")]
    NotFound(Uuid),
    #[error("Item {0} is still referenced by orders")]
    InUse(Uuid),
    #[error("Item store error: {0}")]
    Store(#[from] StoreError),
    #[error("Actor communication error: {0}")]
    ActorCommunication(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),
    #[error("Order-Item not found")]
    OrderItemNotFound,
    #[error("Same items in one order: {0}")]
    DuplicateItem(Uuid),
    #[error("Some items in the order do not exist")]
    MissingItems(Vec<Uuid>),
    #[error("Order must contain at least one item")]
    EmptyOrder,
    #[error("Order {id} in status {status} cannot take payment outcome {outcome:?}")]
    InvalidTransition {
        id: Uuid,
        status: OrderStatus,
        outcome: PaymentStatus,
    },
    #[error(transparent)]
    User(#[from] UserServiceError),
    #[error(transparent)]
    Item(ItemError),
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),
    #[error("Actor communication error: {0}")]
    ActorCommunication(String),
}

impl From<ItemError> for OrderError {
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::ActorCommunication(msg) => OrderError::ActorCommunication(msg),
            other => OrderError::Item(other),
        }
    }
}

/// Failures of the event bus.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    #[error("Event could not be encoded: {0}")]
    Encode(String),
    #[error("Event could not be decoded: {0}")]
    Decode(String),
    #[cfg(feature = "kafka")]
    #[error("Publish failed: {0}")]
    Publish(String),
    #[cfg(feature = "kafka")]
    #[error("Receive failed: {0}")]
    Receive(String),
}
