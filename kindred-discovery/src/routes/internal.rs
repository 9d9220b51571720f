use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use kindred_shared::errors::AppResult;
use kindred_shared::middleware::ApiJson;
use kindred_shared::types::ApiResponse;

use super::blocking;
use crate::models::User;
use crate::services::profile_service;
use crate::store::DiscoveryStore;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ProvisionUserRequest {
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub password_hash: Option<String>,
}

/// POST /internal/users: create the directory entry for a new account. Called service-to-service, no auth.
pub async fn provision_user<S: DiscoveryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ApiJson(mut req): ApiJson<ProvisionUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    req.name = req.name.trim().to_string();
    req.validate()?;

    let user = blocking(&state, move |s| {
        profile_service::provision_user(&s.store, &req.email, &req.name, req.password_hash)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user))))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::testing::TestApp;

    #[tokio::test]
    async fn provisioning_creates_once() {
        let app = TestApp::new();
        let body = json!({ "email": "Dee@Example.com", "name": "Dee" });

        let (status, created) = app.call(Method::POST, "/internal/users", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["email"], "dee@example.com");

        let (status, duplicate) = app.call(Method::POST, "/internal/users", None, Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(duplicate["success"], false);
    }

    #[tokio::test]
    async fn provisioning_rejects_empty_name() {
        let app = TestApp::new();
        for name in ["", "   "] {
            let (status, body) = app
                .call(Method::POST, "/internal/users", None, Some(json!({ "email": "e@example.com", "name": name })))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{name:?}");
            assert_eq!(body["code"], "E0002");
        }
    }
}
