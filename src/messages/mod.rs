use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::{
    Item, NewItem, NewOrderLine, OrderDraft, OrderFilter, OrderItemView, OrderStatus, OrderView,
    PaymentStatus,
};
use crate::error::{ItemError, OrderError};

/// Generic type aliases for service communication
pub type ServiceResult<T, E> = std::result::Result<T, E>;
pub type ServiceResponse<T, E> = oneshot::Sender<ServiceResult<T, E>>;

/// Typed message enums for actor communication. Each variant includes parameters
/// and a oneshot channel for responses.

#[derive(Debug)]
pub enum ItemRequest {
    ListItems {
        respond_to: ServiceResponse<Vec<Item>, ItemError>,
    },
    GetItem {
        id: Uuid,
        respond_to: ServiceResponse<Item, ItemError>,
    },
    GetItems {
        ids: Vec<Uuid>,
        respond_to: ServiceResponse<Vec<Item>, ItemError>,
    },
    CreateItem {
        item: NewItem,
        respond_to: ServiceResponse<Item, ItemError>,
    },
    UpdateItem {
        id: Uuid,
        item: NewItem,
        respond_to: ServiceResponse<Item, ItemError>,
    },
    DeleteItem {
        id: Uuid,
        respond_to: ServiceResponse<(), ItemError>,
    },
    Shutdown,
}

/// `owner: Some(user)` restricts the request to orders of that user.
#[derive(Debug)]
pub enum OrderRequest {
    GetOrder {
        id: Uuid,
        owner: Option<Uuid>,
        respond_to: ServiceResponse<OrderView, OrderError>,
    },
    ListOrders {
        filter: OrderFilter,
        respond_to: ServiceResponse<Vec<OrderView>, OrderError>,
    },
    CreateOrder {
        user_id: Uuid,
        lines: Vec<NewOrderLine>,
        respond_to: ServiceResponse<OrderView, OrderError>,
    },
    UpdateOrder {
        id: Uuid,
        owner: Option<Uuid>,
        draft: OrderDraft,
        respond_to: ServiceResponse<OrderView, OrderError>,
    },
    DeleteOrder {
        id: Uuid,
        owner: Option<Uuid>,
        respond_to: ServiceResponse<(), OrderError>,
    },
    ApplyPayment {
        order_id: Uuid,
        payment_status: PaymentStatus,
        respond_to: ServiceResponse<OrderStatus, OrderError>,
    },
    GetOrderItem {
        id: Uuid,
        respond_to: ServiceResponse<OrderItemView, OrderError>,
    },
    GetOrderItemFor {
        order_id: Uuid,
        item_id: Uuid,
        respond_to: ServiceResponse<OrderItemView, OrderError>,
    },
    OrderItemsForOrder {
        order_id: Uuid,
        respond_to: ServiceResponse<Vec<OrderItemView>, OrderError>,
    },
    OrderItemsForItem {
        item_id: Uuid,
        respond_to: ServiceResponse<Vec<OrderItemView>, OrderError>,
    },
    DeleteOrderItem {
        id: Uuid,
        respond_to: ServiceResponse<(), OrderError>,
    },
    Shutdown,
}
