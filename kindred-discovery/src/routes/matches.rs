use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use kindred_shared::errors::AppResult;
use kindred_shared::middleware::ApiPath;
use kindred_shared::types::auth::AuthUser;
use kindred_shared::types::ApiResponse;

use super::blocking;
use crate::services::discovery::{self, MatchListing, UnmatchOutcome};
use crate::store::DiscoveryStore;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MatchCheckResponse {
    pub matched: bool,
}

/// GET /matches
pub async fn list_matches<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
) -> AppResult<Json<ApiResponse<Vec<MatchListing>>>> {
    let listing = blocking(&state, move |s| discovery::list_matches(&s.store, user.id)).await?;
    Ok(Json(ApiResponse::ok(listing)))
}

/// GET /isMatched/:partner_id
pub async fn is_matched<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(partner_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<MatchCheckResponse>>> {
    let matched = blocking(&state, move |s| discovery::is_matched(&s.store, user.id, partner_id)).await?;
    Ok(Json(ApiResponse::ok(MatchCheckResponse { matched })))
}

/// POST /unmatch/:partner_id
pub async fn unmatch<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(partner_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<UnmatchOutcome>>> {
    let outcome = blocking(&state, move |s| discovery::unmatch(&s.store, user.id, partner_id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::testing::TestApp;
    use crate::store::StoreOp;

    #[tokio::test]
    async fn match_lifecycle_over_http() {
        let app = TestApp::new();
        let a = app.user("a");
        let b = app.user("b");
        app.post(&format!("/{b}/like"), a).await;
        app.post(&format!("/{a}/like"), b).await;

        let (_, check) = app.get(&format!("/isMatched/{b}"), a).await;
        assert_eq!(check["data"]["matched"], true);

        let (status, listing) = app.get("/matches", a).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["data"][0]["partner"]["id"], b.to_string());
        assert_eq!(listing["data"][0]["partner"]["name"], "b");
        assert!(listing["data"][0]["match"]["id"].is_string());

        let (status, outcome) = app.post(&format!("/unmatch/{a}"), b).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["data"]["removed_match"], true);

        let (_, check) = app.get(&format!("/isMatched/{b}"), a).await;
        assert_eq!(check["data"]["matched"], false);
        let (_, listing) = app.get("/matches", a).await;
        assert_eq!(listing["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn partial_unmatch_surfaces_completed_steps() {
        let app = TestApp::new();
        let a = app.user("a");
        let b = app.user("b");
        app.post(&format!("/{b}/like"), a).await;
        app.post(&format!("/{a}/like"), b).await;

        app.state.store.fail_on(StoreOp::DeleteMessages);
        let (status, body) = app.post(&format!("/unmatch/{b}"), a).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "E3004");
        assert_eq!(body["details"]["completed_steps"], 1);
    }
}
