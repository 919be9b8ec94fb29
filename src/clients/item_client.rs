use uuid::Uuid;

use super::macros::{actor_client, client_method};
use crate::domain::{Item, NewItem};
use crate::error::ItemError;
use crate::messages::ItemRequest;

actor_client!(ItemClient, ItemRequest);

client_method!(ItemClient => fn list_items() -> Vec<Item> as ItemRequest::ListItems, Error = ItemError);
client_method!(ItemClient => fn get_item(id: Uuid) -> Item as ItemRequest::GetItem, Error = ItemError);
client_method!(ItemClient => fn get_items(ids: Vec<Uuid>) -> Vec<Item> as ItemRequest::GetItems, Error = ItemError);
client_method!(ItemClient => fn create_item(item: NewItem) -> Item as ItemRequest::CreateItem, Error = ItemError);
client_method!(ItemClient => fn update_item(id: Uuid, item: NewItem) -> Item as ItemRequest::UpdateItem, Error = ItemError);
client_method!(ItemClient => fn delete_item(id: Uuid) -> () as ItemRequest::DeleteItem, Error = ItemError);
