//! Handles for talking to the item and order actors, plus the remote user service.

mod macros;

pub mod item_client;
pub mod order_client;
pub mod user_client;

pub use item_client::ItemClient;
pub use order_client::OrderClient;
pub use user_client::{ClientCredentials, UserClient, UserDirectory};
