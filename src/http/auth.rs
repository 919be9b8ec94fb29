//! Bearer-token authentication for the REST API.
//!
//! Tokens are checked by the auth service; the caller's id and roles are then
//! decoded from the JWT claims without verifying the signature again.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;

const ADMIN_ROLE: &str = "ADMIN";

/// Decides whether a bearer token is currently valid.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> bool;
}

#[derive(Serialize)]
struct ValidationRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct ValidationResponse {
    success: bool,
}

/// Asks the auth service to validate each token.
pub struct AuthServiceVerifier {
    http: reqwest::Client,
    validate_url: String,
}

impl AuthServiceVerifier {
    pub fn new(validate_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            validate_url: validate_url.into(),
        })
    }
}

#[async_trait]
impl TokenVerifier for AuthServiceVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> bool {
        let response = self
            .http
            .post(&self.validate_url)
            .json(&ValidationRequest { token })
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "Auth service refused token");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Auth service unreachable");
                return false;
            }
        };

        match response.json::<ValidationResponse>().await {
            Ok(answer) => answer.success,
            Err(e) => {
                warn!(error = %e, "Unreadable auth service answer");
                false
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    realm_access: Option<RealmAccess>,
}

/// Claims checks are left to the auth service, which has already accepted
/// the token by the time it is decoded here.
fn claims_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Reads the caller out of the JWT claims.
fn caller_from_token(token: &str) -> Option<AuthUser> {
    let key = DecodingKey::from_secret(&[]);
    let claims = jsonwebtoken::decode::<Claims>(token, &key, &claims_validation())
        .map_err(|e| debug!(error = %e, "Undecodable token claims"))
        .ok()?
        .claims;

    let mut roles = claims.roles;
    if let Some(realm) = claims.realm_access {
        roles.extend(realm.roles);
    }
    Some(AuthUser {
        id: Uuid::parse_str(&claims.sub).ok()?,
        roles,
    })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.roles
            .iter()
            .any(|role| role.strip_prefix("ROLE_").unwrap_or(role) == ADMIN_ROLE)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        if !state.verifier.verify(token).await {
            return Err(ApiError::Unauthorized);
        }
        let caller = caller_from_token(token).ok_or_else(|| {
            debug!("Token payload carries no usable subject");
            ApiError::Unauthorized
        })?;
        debug!(user_id = %caller.id, "Caller authenticated");
        Ok(caller)
    }
}

/// An authenticated caller holding the `ADMIN` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let caller = AuthUser::from_request_parts(parts, state).await?;
        if caller.is_admin() {
            Ok(AdminUser(caller))
        } else {
            debug!(user_id = %caller.id, "Admin role missing");
            Err(ApiError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_framework::{
        bearer_token_for, create_mock_item_client, create_mock_order_client, token_with_claims,
        AcceptingVerifier,
    };
    use std::sync::Arc;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[test]
    fn reads_subject_and_roles() {
        let id = Uuid::new_v4();
        let caller = caller_from_token(&bearer_token_for(id, &["ADMIN"])).unwrap();
        assert_eq!(caller.id, id);
        assert!(caller.is_admin());

        let user = caller_from_token(&bearer_token_for(id, &["USER"])).unwrap();
        assert!(!user.is_admin());
    }

    #[test]
    fn reads_realm_roles() {
        let id = Uuid::new_v4();
        let token = token_with_claims(&json!({
            "sub": id.to_string(),
            "aud": "account",
            "exp": 1,
            "realm_access": {"roles": ["ROLE_ADMIN"]}
        }));
        let caller = caller_from_token(&token).unwrap();
        assert!(caller.is_admin());
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert_eq!(caller_from_token("not-a-jwt"), None);
        assert_eq!(caller_from_token("a.%%%.c"), None);
        assert_eq!(caller_from_token(&token_with_claims(&json!({"sub": "alice"}))), None);
        assert_eq!(caller_from_token(&token_with_claims(&json!({"roles": ["ADMIN"]}))), None);
    }

    fn parts_with(token: &str) -> Parts {
        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[tokio::test]
    async fn admin_guard_carries_the_caller() {
        let (items, _item_rx) = create_mock_item_client(1);
        let (orders, _order_rx) = create_mock_order_client(1);
        let state = AppState {
            items,
            orders,
            verifier: Arc::new(AcceptingVerifier::default()),
        };
        let id = Uuid::new_v4();

        let mut parts = parts_with(&bearer_token_for(id, &["ROLE_ADMIN"]));
        let admin = AdminUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(admin.0.id, id);

        let mut parts = parts_with(&bearer_token_for(id, &["USER"]));
        let denied = AdminUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(denied, Err(ApiError::Forbidden)));
    }

    #[tokio::test]
    async fn auth_service_verdict_is_honoured() {
        let router = Router::new().route(
            "/api/v1/auth/validate",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"success": body["token"] == "good"}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let verifier = AuthServiceVerifier::new(
            format!("http://{addr}/api/v1/auth/validate"),
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(verifier.verify("good").await);
        assert!(!verifier.verify("bad").await);

        let offline =
            AuthServiceVerifier::new("http://127.0.0.1:1/validate", Duration::from_secs(1)).unwrap();
        assert!(!offline.verify("good").await);
    }
}
