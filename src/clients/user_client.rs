use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::User;
use crate::error::UserServiceError;

/// Tokens are refreshed this long before the issuer says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Source of user profiles, owned by the remote user service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<User, UserServiceError>;

    /// Users the service knows among `ids`. Unknown ids are left out.
    async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>, UserServiceError>;
}

/// OAuth2 client-credentials registration used to call the user service.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.refresh_at.map_or(true, |at| Instant::now() < at)
    }
}

/// HTTP client of the user service.
pub struct UserClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Option<ClientCredentials>,
    token: Mutex<Option<CachedToken>>,
}

impl UserClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Option<ClientCredentials>,
    ) -> Result<Self, UserServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UserServiceError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Returns a cached access token, fetching a new one when it is about to expire.
    async fn access_token(&self) -> Result<Option<String>, UserServiceError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(Some(token.value.clone()));
        }

        debug!(token_url = %credentials.token_url, "Requesting client-credentials token");
        let response = self
            .http
            .post(&credentials.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(unavailable)?;
        let token: TokenResponse = read_json(response).await?;

        let refresh_at = token
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN));
        info!(expires_in = ?token.expires_in, "Obtained user service token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });
        Ok(Some(token.access_token))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UserServiceError> {
        let mut request = self.http.get(format!("{}{}", self.base_url, path)).query(query);
        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(unavailable)?;
        read_json(response).await
    }
}

fn unavailable(err: reqwest::Error) -> UserServiceError {
    warn!(error = %err, "User service unreachable");
    UserServiceError::Unavailable(err.to_string())
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UserServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "User service rejected request");
        return Err(UserServiceError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| UserServiceError::Decode(e.to_string()))
}

#[async_trait]
impl UserDirectory for UserClient {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn get_user(&self, id: Uuid) -> Result<User, UserServiceError> {
        debug!("Fetching user");
        self.get_json(&format!("/api/v1/users/{id}"), &[]).await
    }

    #[instrument(skip(self, ids), fields(user_count = ids.len()))]
    async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>, UserServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Fetching users");
        let joined = ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.get_json("/api/v1/users/batch", &[("ids", joined)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn known_user() -> User {
        User::new(
            Uuid::parse_str("8f14e45f-ceea-467f-a0a4-7e1e4f9c6a11").unwrap(),
            "Alice",
            "alice@example.com",
        )
    }

    fn user_routes() -> Router {
        Router::new()
            .route(
                "/api/v1/users/batch",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let known = known_user();
                    let wanted = params.get("ids").cloned().unwrap_or_default();
                    let users: Vec<User> = wanted
                        .split(',')
                        .filter(|id| *id == known.id.to_string())
                        .map(|_| known.clone())
                        .collect();
                    Json(users)
                }),
            )
            .route(
                "/api/v1/users/:id",
                get(|Path(id): Path<Uuid>| async move {
                    if id == known_user().id {
                        Ok(Json(known_user()))
                    } else {
                        Err((StatusCode::NOT_FOUND, "user not found"))
                    }
                }),
            )
    }

    #[tokio::test]
    async fn fetches_single_user() {
        let base = serve(user_routes()).await;
        let client = UserClient::new(base, Duration::from_secs(2), None).unwrap();

        let user = client.get_user(known_user().id).await.unwrap();
        assert_eq!(user, known_user());
    }

    #[tokio::test]
    async fn rejection_keeps_status_and_body() {
        let base = serve(user_routes()).await;
        let client = UserClient::new(base, Duration::from_secs(2), None).unwrap();

        let err = client.get_user(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(
            err,
            UserServiceError::Rejected {
                status: 404,
                body: "user not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn batch_skips_unknown_users_and_short_circuits_empty() {
        let base = serve(user_routes()).await;
        let client = UserClient::new(base, Duration::from_secs(2), None).unwrap();

        let users = client
            .get_users(&[Uuid::new_v4(), known_user().id])
            .await
            .unwrap();
        assert_eq!(users, vec![known_user()]);
        assert!(client.get_users(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UserClient::new(format!("http://{addr}"), Duration::from_secs(2), None).unwrap();
        let err = client.get_user(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, UserServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn client_credentials_token_is_cached_and_attached() {
        let issued = Arc::new(AtomicUsize::new(0));
        let counter = issued.clone();
        let router = Router::new()
            .route(
                "/token",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({ "access_token": "secret-token", "expires_in": 300 }))
                    }
                }),
            )
            .route(
                "/api/v1/users/:id",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer secret-token") => Ok(Json(known_user())),
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }),
            );
        let base = serve(router).await;
        let credentials = ClientCredentials {
            token_url: format!("{base}/token"),
            client_id: "order-service".to_string(),
            client_secret: "s3cret".to_string(),
        };
        let client = UserClient::new(base, Duration::from_secs(2), Some(credentials)).unwrap();

        client.get_user(known_user().id).await.unwrap();
        client.get_user(known_user().id).await.unwrap();
        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }
}
