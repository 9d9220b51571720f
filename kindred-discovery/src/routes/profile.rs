use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use kindred_shared::errors::AppResult;
use kindred_shared::middleware::ApiJson;
use kindred_shared::types::auth::AuthUser;
use kindred_shared::types::ApiResponse;

use super::blocking;
use crate::models::{UpdateProfile, User};
use crate::services::profile_service;
use crate::store::DiscoveryStore;
use crate::AppState;

// --- GET /me ---

pub async fn get_profile<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
) -> AppResult<Json<ApiResponse<User>>> {
    let profile = blocking(&state, move |s| profile_service::get_profile(&s.store, user.id)).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- PATCH /me ---

pub async fn update_profile<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiJson(payload): ApiJson<UpdateProfile>,
) -> AppResult<Json<ApiResponse<User>>> {
    let updated = blocking(&state, move |s| {
        profile_service::update_profile(&s.store, user.id, &payload)
    })
    .await?;
    Ok(Json(ApiResponse::ok(updated)))
}
