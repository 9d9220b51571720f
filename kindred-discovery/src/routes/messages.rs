use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use kindred_shared::errors::AppResult;
use kindred_shared::middleware::{ApiJson, ApiPath};
use kindred_shared::types::auth::AuthUser;
use kindred_shared::types::ApiResponse;

use super::blocking;
use crate::models::Message;
use crate::services::messaging;
use crate::store::DiscoveryStore;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub text: String,
}

// --- GET /messages/:partner_id ---

pub async fn list_messages<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(partner_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let thread = blocking(&state, move |s| messaging::list_messages(&s.store, user.id, partner_id)).await?;
    Ok(Json(ApiResponse::ok(thread)))
}

// --- POST /messages/:partner_id ---

pub async fn send_message<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(partner_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<MessageBody>,
) -> AppResult<(StatusCode, Json<ApiResponse<Message>>)> {
    let message = blocking(&state, move |s| {
        messaging::send_message(&s.store, user.id, partner_id, &body.text, s.config.max_message_length)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}

// --- PATCH /messages/item/:message_id ---

pub async fn edit_message<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(message_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<MessageBody>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = blocking(&state, move |s| {
        messaging::edit_message(&s.store, user.id, message_id, &body.text, s.config.max_message_length)
    })
    .await?;
    Ok(Json(ApiResponse::ok(message)))
}

// --- DELETE /messages/item/:message_id ---

pub async fn delete_message<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(message_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    blocking(&state, move |s| messaging::delete_message(&s.store, user.id, message_id)).await?;
    Ok(Json(ApiResponse::ok_with_message((), "message deleted")))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::testing::TestApp;

    #[tokio::test]
    async fn conversation_between_matched_users() {
        let app = TestApp::new();
        let a = app.user("a");
        let b = app.user("b");
        app.post(&format!("/{b}/like"), a).await;
        app.post(&format!("/{a}/like"), b).await;

        let (status, sent) = app
            .call(Method::POST, &format!("/messages/{b}"), Some(a), Some(json!({ "text": " hey " })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["data"]["text"], "hey");
        let message_id = sent["data"]["id"].as_str().unwrap().to_string();

        let (status, edited) = app
            .call(
                Method::PATCH,
                &format!("/messages/item/{message_id}"),
                Some(a),
                Some(json!({ "text": "hey there" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(edited["data"]["edited_at"].is_string());

        let (_, thread) = app.get(&format!("/messages/{a}"), b).await;
        assert_eq!(thread["data"][0]["text"], "hey there");

        let (status, _) = app
            .call(Method::DELETE, &format!("/messages/item/{message_id}"), Some(a), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, thread) = app.get(&format!("/messages/{a}"), b).await;
        assert_eq!(thread["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn malformed_bodies_and_ids_get_the_error_envelope() {
        let app = TestApp::new();
        let a = app.user("a");
        let b = app.user("b");

        let (status, body) = app
            .call(Method::POST, &format!("/messages/{b}"), Some(a), Some(json!({ "txt": "hi" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "E0008");

        let (status, body) = app.get("/messages/item-42", a).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "E0008");
    }

    #[tokio::test]
    async fn unmatched_users_cannot_message() {
        let app = TestApp::new();
        let a = app.user("a");
        let b = app.user("b");

        let (status, body) = app
            .call(Method::POST, &format!("/messages/{b}"), Some(a), Some(json!({ "text": "hi" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "E3003");
    }
}
