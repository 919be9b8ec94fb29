use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::domain::FieldViolation;
use crate::error::{ItemError, OrderError, StoreError, UserServiceError};

/// Everything a REST handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Full authentication is required to access this resource")]
    Unauthorized,
    #[error("Access denied")]
    Forbidden,
    #[error("Parameter '{name}' must be a '{expected}'")]
    BadParameter {
        name: &'static str,
        expected: &'static str,
    },
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
    #[error("Field validation failed")]
    Validation(Vec<FieldViolation>),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Order(#[from] OrderError),
}

/// JSON body of every error answer.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub validations: Option<Vec<FieldViolation>>,
}

impl ApiError {
    pub fn bad_parameter(name: &'static str, expected: &'static str) -> Self {
        ApiError::BadParameter { name, expected }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadParameter { .. } | ApiError::MalformedBody(_) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Item(e) => item_status(e),
            ApiError::Order(e) => order_status(e),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Item(ItemError::NotFound(_))
            | ApiError::Order(OrderError::Item(ItemError::NotFound(_))) => {
                "Item not found".to_string()
            }
            ApiError::Order(OrderError::NotFound(_)) => "Order not found".to_string(),
            ApiError::Order(OrderError::DuplicateItem(_)) => "Same items in one order".to_string(),
            other => match other.status() {
                StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
                _ => other.to_string(),
            },
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn item_status(err: &ItemError) -> StatusCode {
    match err {
        ItemError::NotFound(_) => StatusCode::NOT_FOUND,
        ItemError::InUse(_) => StatusCode::CONFLICT,
        ItemError::Store(e) => store_status(e),
        ItemError::ActorCommunication(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound(_) | OrderError::OrderItemNotFound | OrderError::MissingItems(_) => {
            StatusCode::NOT_FOUND
        }
        OrderError::DuplicateItem(_) | OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        OrderError::EmptyOrder => StatusCode::BAD_REQUEST,
        OrderError::User(UserServiceError::Rejected { status, .. }) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        OrderError::User(_) => StatusCode::BAD_GATEWAY,
        OrderError::Item(e) => item_status(e),
        OrderError::Store(e) => store_status(e),
        OrderError::ActorCommunication(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Answers of the user service are relayed as they came.
fn passthrough(status: StatusCode, body: String) -> Response {
    let content_type = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, %status, "Request failed");
        } else {
            debug!(error = %self, %status, "Request rejected");
        }

        if let ApiError::Order(OrderError::User(UserServiceError::Rejected { body, .. })) = self {
            return passthrough(status, body);
        }

        let message = self.message();
        let validations = match self {
            ApiError::Validation(violations) => Some(violations),
            _ => None,
        };
        let body = ErrorBody {
            timestamp: Utc::now(),
            message,
            validations,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use uuid::Uuid;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_lists_every_field() {
        let (status, body) = render(ApiError::Validation(vec![
            FieldViolation::new("name", "Name must not be blank"),
            FieldViolation::new("price", "Price must be provided"),
        ]))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Field validation failed");
        assert_eq!(body["validations"][1]["field"], "price");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn domain_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (ApiError::from(ItemError::NotFound(id)), 404, "Item not found"),
            (ApiError::from(OrderError::NotFound(id)), 404, "Order not found"),
            (ApiError::from(OrderError::OrderItemNotFound), 404, "Order-Item not found"),
            (
                ApiError::from(OrderError::MissingItems(vec![id])),
                404,
                "Some items in the order do not exist",
            ),
            (ApiError::from(OrderError::DuplicateItem(id)), 409, "Same items in one order"),
            (
                ApiError::from(OrderError::User(UserServiceError::Unavailable("timeout".into()))),
                502,
                "External service is unavailable",
            ),
            (
                ApiError::from(OrderError::Store(StoreError::Database("boom".into()))),
                500,
                "Internal server error",
            ),
            (
                ApiError::bad_parameter("id", "UUID"),
                400,
                "Parameter 'id' must be a 'UUID'",
            ),
        ];

        for (err, status, message) in cases {
            let (actual_status, body) = render(err).await;
            assert_eq!(actual_status.as_u16(), status, "{message}");
            assert_eq!(body["message"], message);
            assert_eq!(body["validations"], Value::Null);
        }
    }

    #[tokio::test]
    async fn user_service_rejection_passes_through() {
        let err = ApiError::from(OrderError::User(UserServiceError::Rejected {
            status: 404,
            body: r#"{"message":"User not found"}"#.to_string(),
        }));

        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({"message": "User not found"}));
    }
}
