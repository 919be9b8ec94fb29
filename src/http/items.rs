use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::instrument;

use super::auth::{AdminUser, AuthUser};
use super::{ids_param, parse_uuid, ApiError, AppState, ValidJson};
use crate::domain::{Item, ItemInput, OrderItemView};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/items", get(list_items).post(create_item))
        .route("/api/v1/items/batch", get(items_by_ids))
        .route(
            "/api/v1/items/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/api/v1/items/:id/order-items", get(order_items_for_item))
}

#[instrument(skip_all)]
async fn list_items(_: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<Item>>, ApiError> {
    Ok(Json(state.items.list_items().await?))
}

#[instrument(skip_all)]
async fn items_by_ids(
    _: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let ids = ids_param(&query)?;
    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.items.get_items(ids).await?))
}

#[instrument(skip(state, _caller))]
async fn get_item(
    _caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.items.get_item(id).await?))
}

#[instrument(skip_all)]
async fn create_item(
    _: AuthUser,
    State(state): State<AppState>,
    ValidJson(item): ValidJson<ItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.items.create_item(item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[instrument(skip(state, _caller, item))]
async fn update_item(
    _caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(item): ValidJson<ItemInput>,
) -> Result<Json<Item>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.items.update_item(id, item).await?))
}

#[instrument(skip(state, _caller))]
async fn delete_item(
    _caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_uuid("id", &id)?;
    state.items.delete_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn order_items_for_item(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderItemView>>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.orders.order_items_for_item(id).await?))
}
