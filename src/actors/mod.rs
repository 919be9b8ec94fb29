//! Actors owning the catalog and the orders.
//!
//! [`ItemService`] is a sub-actor; [`OrderService`] is the root actor that
//! coordinates it with the user service and the event bus.

mod item_service;
mod order_service;

pub use item_service::ItemService;
pub use order_service::OrderService;
