use uuid::Uuid;

use super::macros::{actor_client, client_method};
use crate::domain::{
    NewOrderLine, OrderDraft, OrderFilter, OrderItemView, OrderStatus, OrderView, PaymentStatus,
};
use crate::error::OrderError;
use crate::messages::OrderRequest;

actor_client!(OrderClient, OrderRequest);

client_method!(OrderClient => fn get_order(id: Uuid, owner: Option<Uuid>) -> OrderView as OrderRequest::GetOrder, Error = OrderError);
client_method!(OrderClient => fn list_orders(filter: OrderFilter) -> Vec<OrderView> as OrderRequest::ListOrders, Error = OrderError);
client_method!(OrderClient => fn create_order(user_id: Uuid, lines: Vec<NewOrderLine>) -> OrderView as OrderRequest::CreateOrder, Error = OrderError);
client_method!(OrderClient => fn update_order(id: Uuid, owner: Option<Uuid>, draft: OrderDraft) -> OrderView as OrderRequest::UpdateOrder, Error = OrderError);
client_method!(OrderClient => fn delete_order(id: Uuid, owner: Option<Uuid>) -> () as OrderRequest::DeleteOrder, Error = OrderError);
client_method!(OrderClient => fn apply_payment(order_id: Uuid, payment_status: PaymentStatus) -> OrderStatus as OrderRequest::ApplyPayment, Error = OrderError);

// order-items
client_method!(OrderClient => fn get_order_item(id: Uuid) -> OrderItemView as OrderRequest::GetOrderItem, Error = OrderError);
client_method!(OrderClient => fn get_order_item_for(order_id: Uuid, item_id: Uuid) -> OrderItemView as OrderRequest::GetOrderItemFor, Error = OrderError);
client_method!(OrderClient => fn order_items_for_order(order_id: Uuid) -> Vec<OrderItemView> as OrderRequest::OrderItemsForOrder, Error = OrderError);
client_method!(OrderClient => fn order_items_for_item(item_id: Uuid) -> Vec<OrderItemView> as OrderRequest::OrderItemsForItem, Error = OrderError);
client_method!(OrderClient => fn delete_order_item(id: Uuid) -> () as OrderRequest::DeleteOrderItem, Error = OrderError);
