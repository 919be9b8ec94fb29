use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::ItemClient;
use crate::domain::{Item, NewItem};
use crate::error::{ItemError, StoreError};
use crate::messages::{ItemRequest, ServiceResponse};
use crate::store::ItemStore;

/// Catalog actor. Owns the item store and answers [`ItemRequest`]s one at a time.
pub struct ItemService {
    receiver: mpsc::Receiver<ItemRequest>,
    store: Arc<dyn ItemStore>,
}

impl ItemService {
    pub fn new(buffer_size: usize, store: Arc<dyn ItemStore>) -> (Self, ItemClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let service = Self { receiver, store };
        (service, ItemClient::new(sender))
    }

    #[instrument(name = "item_service", skip(self))]
    pub async fn run(mut self) {
        info!("ItemService starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ItemRequest::ListItems { respond_to } => {
                    self.handle_list_items(respond_to).await;
                }
                ItemRequest::GetItem { id, respond_to } => {
                    self.handle_get_item(id, respond_to).await;
                }
                ItemRequest::GetItems { ids, respond_to } => {
                    self.handle_get_items(ids, respond_to).await;
                }
                ItemRequest::CreateItem { item, respond_to } => {
                    self.handle_create_item(item, respond_to).await;
                }
                ItemRequest::UpdateItem {
                    id,
                    item,
                    respond_to,
                } => {
                    self.handle_update_item(id, item, respond_to).await;
                }
                ItemRequest::DeleteItem { id, respond_to } => {
                    self.handle_delete_item(id, respond_to).await;
                }
                ItemRequest::Shutdown => {
                    info!("ItemService shutting down");
                    break;
                }
            }
        }

        info!("ItemService stopped");
    }

    #[instrument(skip(self, respond_to))]
    async fn handle_list_items(&self, respond_to: ServiceResponse<Vec<Item>, ItemError>) {
        debug!("Processing list_items request");

        let result = self.store.find_all().await.map_err(ItemError::from);
        if let Ok(items) = &result {
            info!(item_count = items.len(), "Listed items");
        }
        let _ = respond_to.send(result);
    }

    #[instrument(fields(item_id = %id), skip(self, respond_to))]
    async fn handle_get_item(&self, id: Uuid, respond_to: ServiceResponse<Item, ItemError>) {
        debug!("Processing get_item request");

        let result = match self.store.find_by_id(id).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => {
                debug!("Item not found");
                Err(ItemError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        };
        let _ = respond_to.send(result);
    }

    #[instrument(fields(item_count = ids.len()), skip(self, ids, respond_to))]
    async fn handle_get_items(
        &self,
        ids: Vec<Uuid>,
        respond_to: ServiceResponse<Vec<Item>, ItemError>,
    ) {
        debug!("Processing get_items request");

        let result = self.store.find_by_ids(&ids).await.map_err(ItemError::from);
        if let Ok(items) = &result {
            debug!(found = items.len(), "Items resolved");
        }
        let _ = respond_to.send(result);
    }

    #[instrument(fields(item_name = %item.name, price = %item.price), skip(self, item, respond_to))]
    async fn handle_create_item(&self, item: NewItem, respond_to: ServiceResponse<Item, ItemError>) {
        debug!("Processing create_item request");

        let result = self.store.create(item).await.map_err(ItemError::from);
        match &result {
            Ok(item) => info!(item_id = %item.id, "Item created successfully"),
            Err(e) => error!(error = %e, "Item creation failed"),
        }
        let _ = respond_to.send(result);
    }

    #[instrument(fields(item_id = %id, item_name = %item.name), skip(self, item, respond_to))]
    async fn handle_update_item(
        &self,
        id: Uuid,
        item: NewItem,
        respond_to: ServiceResponse<Item, ItemError>,
    ) {
        debug!("Processing update_item request");

        let result = match self.store.update(id, item).await {
            Ok(Some(item)) => {
                info!("Item updated successfully");
                Ok(item)
            }
            Ok(None) => {
                warn!("Item not found for update");
                Err(ItemError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        };
        let _ = respond_to.send(result);
    }

    #[instrument(fields(item_id = %id), skip(self, respond_to))]
    async fn handle_delete_item(&self, id: Uuid, respond_to: ServiceResponse<(), ItemError>) {
        debug!("Processing delete_item request");

        let result = match self.store.delete(id).await {
            Ok(deleted) => {
                info!(deleted, "Item delete handled");
                Ok(())
            }
            Err(StoreError::Conflict(_)) => {
                warn!("Item is still referenced by orders");
                Err(ItemError::InUse(id))
            }
            Err(e) => Err(e.into()),
        };
        let _ = respond_to.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewOrderLine, OrderStatus};
    use crate::store::{InMemoryStore, OrderStore};
    use rust_decimal::Decimal;

    fn start(store: InMemoryStore) -> ItemClient {
        let (service, client) = ItemService::new(8, Arc::new(store));
        tokio::spawn(service.run());
        client
    }

    #[tokio::test]
    async fn create_then_get_and_update() {
        let client = start(InMemoryStore::new());

        let created = client
            .create_item(NewItem::new("Notebook", Decimal::new(499, 2)))
            .await
            .unwrap();
        assert_eq!(client.get_item(created.id).await.unwrap(), created);

        let updated = client
            .update_item(created.id, NewItem::new("Notebook A5", Decimal::new(550, 2)))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Notebook A5");
        assert_eq!(client.list_items().await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let client = start(InMemoryStore::new());
        let id = Uuid::new_v4();

        assert_eq!(client.get_item(id).await, Err(ItemError::NotFound(id)));
        assert_eq!(
            client
                .update_item(id, NewItem::new("Ghost", Decimal::ONE))
                .await,
            Err(ItemError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn batch_lookup_skips_unknown_ids() {
        let client = start(InMemoryStore::new());
        let item = client
            .create_item(NewItem::new("Stapler", Decimal::new(1200, 2)))
            .await
            .unwrap();

        let found = client.get_items(vec![Uuid::new_v4(), item.id]).await.unwrap();
        assert_eq!(found, vec![item]);
    }

    #[tokio::test]
    async fn delete_is_idempotent_but_refuses_referenced_items() {
        let store = InMemoryStore::new();
        let client = start(store.clone());
        let used = client
            .create_item(NewItem::new("Pen", Decimal::ONE))
            .await
            .unwrap();
        let unused = client
            .create_item(NewItem::new("Eraser", Decimal::ONE))
            .await
            .unwrap();
        OrderStore::create(
            &store,
            Uuid::new_v4(),
            OrderStatus::New,
            &[NewOrderLine::new(used.id, 1)],
        )
        .await
        .unwrap();

        assert_eq!(client.delete_item(used.id).await, Err(ItemError::InUse(used.id)));
        assert_eq!(client.delete_item(unused.id).await, Ok(()));
        assert_eq!(client.delete_item(unused.id).await, Ok(()));
    }

    #[tokio::test]
    async fn shutdown_stops_the_actor() {
        let (service, client) = ItemService::new(8, Arc::new(InMemoryStore::new()));
        let handle = tokio::spawn(service.run());

        client.shutdown().await.unwrap();
        handle.await.unwrap();
        assert!(matches!(
            client.list_items().await,
            Err(ItemError::ActorCommunication(_))
        ));
    }
}
