use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::instrument;

use super::auth::{AdminUser, AuthUser};
use super::{ids_param, parse_uuid, ApiError, AppState, ValidJson};
use crate::domain::{OrderDraft, OrderFilter, OrderInput, OrderItemView, OrderStatus, OrderView, UserOrderInput};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        // caller-owned orders
        .route("/api/v1/orders/me", get(my_orders).post(create_my_order))
        .route("/api/v1/orders/me/batch", get(my_orders_by_ids))
        .route(
            "/api/v1/orders/me/:id",
            get(get_my_order).put(update_my_order).delete(delete_my_order),
        )
        // administration
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/batch", get(orders_by_ids))
        .route(
            "/api/v1/orders/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/api/v1/orders/:id/items", get(order_items_of_order))
        .route("/api/v1/orders/:id/items/:item_id", get(order_item_of_order))
        .route(
            "/api/v1/order-items/:id",
            get(get_order_item).delete(delete_order_item),
        )
}

/// `status=` with an empty value means no status filter.
fn status_param(query: &[(String, String)]) -> Result<Option<OrderStatus>, ApiError> {
    query
        .iter()
        .find(|(key, _)| key == "status")
        .map(|(_, raw)| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| OrderStatus::from_str(raw).map_err(|_| ApiError::bad_parameter("status", "Status")))
        .transpose()
}

async fn list(state: &AppState, filter: OrderFilter) -> Result<Json<Vec<OrderView>>, ApiError> {
    if matches!(&filter.ids, Some(ids) if ids.is_empty()) {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.orders.list_orders(filter).await?))
}

// -----------------------------------------------------------------------------
// Caller-owned orders
// -----------------------------------------------------------------------------

#[instrument(skip_all, fields(user_id = %caller.id))]
async fn my_orders(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let status = status_param(&query)?;
    list(&state, OrderFilter::by_user(caller.id).with_status(status)).await
}

#[instrument(skip_all, fields(user_id = %caller.id))]
async fn my_orders_by_ids(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let ids = ids_param(&query)?;
    list(&state, OrderFilter::by_ids(ids).owned_by(caller.id)).await
}

#[instrument(skip_all, fields(user_id = %caller.id))]
async fn get_my_order(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.orders.get_order(id, Some(caller.id)).await?))
}

#[instrument(skip_all, fields(user_id = %caller.id))]
async fn create_my_order(
    caller: AuthUser,
    State(state): State<AppState>,
    ValidJson(lines): ValidJson<UserOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.orders.create_order(caller.id, lines).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[instrument(skip_all, fields(user_id = %caller.id))]
async fn update_my_order(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(lines): ValidJson<UserOrderInput>,
) -> Result<Json<OrderView>, ApiError> {
    let id = parse_uuid("id", &id)?;
    let draft = OrderDraft {
        user_id: caller.id,
        status: None,
        lines,
    };
    Ok(Json(state.orders.update_order(id, Some(caller.id), draft).await?))
}

#[instrument(skip_all, fields(user_id = %caller.id))]
async fn delete_my_order(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_uuid("id", &id)?;
    state.orders.delete_order(id, Some(caller.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Administration
// -----------------------------------------------------------------------------

#[instrument(skip_all, fields(admin_id = %admin.0.id))]
async fn list_orders(
    admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let status = status_param(&query)?;
    list(&state, OrderFilter::default().with_status(status)).await
}

#[instrument(skip_all, fields(admin_id = %admin.0.id))]
async fn orders_by_ids(
    admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let ids = ids_param(&query)?;
    list(&state, OrderFilter::by_ids(ids)).await
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn get_order(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.orders.get_order(id, None).await?))
}

#[instrument(skip_all, fields(admin_id = %admin.0.id))]
async fn create_order(
    admin: AdminUser,
    State(state): State<AppState>,
    ValidJson(draft): ValidJson<OrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.orders.create_order(draft.user_id, draft.lines).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[instrument(skip(state, admin, draft), fields(admin_id = %admin.0.id))]
async fn update_order(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(draft): ValidJson<OrderInput>,
) -> Result<Json<OrderView>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.orders.update_order(id, None, draft).await?))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn delete_order(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_uuid("id", &id)?;
    state.orders.delete_order(id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn order_items_of_order(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderItemView>>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.orders.order_items_for_order(id).await?))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn order_item_of_order(
    admin: AdminUser,
    State(state): State<AppState>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Json<OrderItemView>, ApiError> {
    let id = parse_uuid("id", &id)?;
    let item_id = parse_uuid("itemId", &item_id)?;
    Ok(Json(state.orders.get_order_item_for(id, item_id).await?))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn get_order_item(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderItemView>, ApiError> {
    let id = parse_uuid("id", &id)?;
    Ok(Json(state.orders.get_order_item(id).await?))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
async fn delete_order_item(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_uuid("id", &id)?;
    state.orders.delete_order_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
