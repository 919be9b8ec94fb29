//! # Mock Framework
//!
//! Utilities for testing actors and their callers in isolation.
//!
//! Use [`create_mock_item_client`] or [`create_mock_order_client`] to get a
//! client and the receiver behind it. Then use helpers like
//! [`expect_get_items`] to assert what was sent and script the reply.
//! [`StaticUserDirectory`] stands in for the remote user service and
//! [`AcceptingVerifier`] for the auth service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::clients::{ItemClient, OrderClient, UserDirectory};
use crate::domain::{Item, OrderStatus, PaymentStatus, User};
use crate::error::{ItemError, OrderError, UserServiceError};
use crate::http::TokenVerifier;
use crate::messages::{ItemRequest, OrderRequest, ServiceResponse};

/// Creates an item client whose requests land in the returned receiver.
///
/// No actor runs behind it: the test reads each request and answers it,
/// which makes failures and delays deterministic.
pub fn create_mock_item_client(buffer_size: usize) -> (ItemClient, mpsc::Receiver<ItemRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ItemClient::new(sender), receiver)
}

pub fn create_mock_order_client(buffer_size: usize) -> (OrderClient, mpsc::Receiver<OrderRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (OrderClient::new(sender), receiver)
}

/// Helper to verify that the next message is a GetItems request
pub async fn expect_get_items(
    receiver: &mut mpsc::Receiver<ItemRequest>,
) -> Option<(Vec<Uuid>, ServiceResponse<Vec<Item>, ItemError>)> {
    match receiver.recv().await {
        Some(ItemRequest::GetItems { ids, respond_to }) => Some((ids, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an ApplyPayment request
pub async fn expect_apply_payment(
    receiver: &mut mpsc::Receiver<OrderRequest>,
) -> Option<(Uuid, PaymentStatus, ServiceResponse<OrderStatus, OrderError>)> {
    match receiver.recv().await {
        Some(OrderRequest::ApplyPayment {
            order_id,
            payment_status,
            respond_to,
        }) => Some((order_id, payment_status, respond_to)),
        _ => None,
    }
}

/// User directory answering from memory.
///
/// Unknown users are rejected with a 404 like the real service does;
/// `set_available(false)` simulates the service being unreachable.
pub struct StaticUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
    available: AtomicBool,
}

impl Default for StaticUserDirectory {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl StaticUserDirectory {
    pub async fn add(&self, name: &str) -> User {
        let user = User::new(
            Uuid::new_v4(),
            name,
            format!("{}@example.com", name.to_lowercase()),
        );
        self.users.write().await.insert(user.id, user.clone());
        user
    }

    pub async fn remove(&self, id: Uuid) {
        self.users.write().await.remove(&id);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), UserServiceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(UserServiceError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn get_user(&self, id: Uuid) -> Result<User, UserServiceError> {
        self.check_available()?;
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| UserServiceError::Rejected {
                status: 404,
                body: format!(r#"{{"message":"User {id} not found"}}"#),
            })
    }

    async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>, UserServiceError> {
        self.check_available()?;
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}

/// JWT for `user_id` carrying `roles`, signed with a throwaway key.
pub fn bearer_token_for(user_id: Uuid, roles: &[&str]) -> String {
    token_with_claims(&serde_json::json!({ "sub": user_id.to_string(), "roles": roles }))
}

/// HS256 JWT with arbitrary claims.
pub fn token_with_claims(claims: &serde_json::Value) -> String {
    jsonwebtoken::encode(&Header::default(), claims, &EncodingKey::from_secret(b"test-only"))
        .expect("claims serialize")
}

/// Accepts every token except the ones listed as revoked.
#[derive(Default)]
pub struct AcceptingVerifier {
    pub revoked: Vec<String>,
}

#[async_trait]
impl TokenVerifier for AcceptingVerifier {
    async fn verify(&self, token: &str) -> bool {
        !self.revoked.iter().any(|revoked| revoked == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_mock_item_client() {
        let (client, mut receiver) = create_mock_item_client(10);
        let wanted = Uuid::new_v4();

        let lookup = tokio::spawn(async move { client.get_items(vec![wanted]).await });

        let (ids, responder) = expect_get_items(&mut receiver)
            .await
            .expect("Expected GetItems request");
        assert_eq!(ids, vec![wanted]);
        let item = Item {
            id: wanted,
            name: "Pen".to_string(),
            price: Decimal::ONE,
        };
        responder.send(Ok(vec![item.clone()])).unwrap();

        assert_eq!(lookup.await.unwrap(), Ok(vec![item]));
    }

    #[tokio::test]
    async fn static_directory_rejects_unknown_users() {
        let directory = StaticUserDirectory::default();
        let alice = directory.add("Alice").await;

        assert_eq!(directory.get_user(alice.id).await, Ok(alice.clone()));
        assert!(matches!(
            directory.get_user(Uuid::new_v4()).await,
            Err(UserServiceError::Rejected { status: 404, .. })
        ));
        assert_eq!(
            directory.get_users(&[Uuid::new_v4(), alice.id]).await,
            Ok(vec![alice])
        );
    }
}
