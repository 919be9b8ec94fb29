//! REST API over the item and order actors.

pub mod auth;
pub mod error;
mod items;
mod orders;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::clients::{ItemClient, OrderClient};
use crate::domain::Checked;

pub use auth::{AuthServiceVerifier, TokenVerifier};
pub use error::ApiError;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub items: ItemClient,
    pub orders: OrderClient,
    pub verifier: Arc<dyn TokenVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(items::routes())
        .merge(orders::routes())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "UP" })))
}

/// JSON body of type `T` that passed validation; holds its [`Checked`] form.
pub struct ValidJson<T: Checked>(pub T::Output);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: Checked + DeserializeOwned + Send,
    T::Output: Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(input) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::MalformedBody(rejection.body_text()))?;
        input.checked().map(ValidJson).map_err(ApiError::Validation)
    }
}

fn parse_uuid(name: &'static str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_parameter(name, "UUID"))
}

/// Collects `ids` from the query; both `ids=a,b` and `ids=a&ids=b` work.
fn ids_param(query: &[(String, String)]) -> Result<Vec<Uuid>, ApiError> {
    let mut ids = Vec::new();
    for raw in query
        .iter()
        .filter(|(key, _)| key == "ids")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
    {
        let id = Uuid::parse_str(raw).map_err(|_| ApiError::bad_parameter("ids", "Set<UUID>"))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ids_accept_commas_and_repeats() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ids = ids_param(&query(&[
            ("ids", &format!("{a}, {b}")),
            ("ids", &a.to_string()),
            ("other", "x"),
        ]))
        .unwrap();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(ids_param(&query(&[])).unwrap(), Vec::<Uuid>::new());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let err = ids_param(&query(&[("ids", "nope")])).unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'ids' must be a 'Set<UUID>'");
        let err = parse_uuid("id", "42").unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'id' must be a 'UUID'");
    }
}
