use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use kindred_shared::errors::{AppError, AppResult};
use kindred_shared::middleware::{ApiPath, ApiQuery};
use kindred_shared::types::auth::AuthUser;
use kindred_shared::types::ApiResponse;

use super::blocking;
use crate::models::{GeoPoint, ProfileCard};
use crate::services::discovery::{self, DeclineOutcome, LikeOutcome};
use crate::services::feed::{self, Candidate, FeedFilters};
use crate::store::DiscoveryStore;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub max_distance_km: Option<f64>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl FeedQuery {
    /// Feed requests must carry a position; the unfiltered feed is not served over HTTP.
    fn into_filters(self) -> AppResult<FeedFilters> {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(AppError::bad_request("lat and lon are required"));
        };

        let defaults = FeedFilters::default();
        Ok(FeedFilters {
            min_age: self.min_age.unwrap_or(defaults.min_age),
            max_age: self.max_age.unwrap_or(defaults.max_age),
            position: Some(GeoPoint::new(lon, lat)),
            max_distance_km: self.max_distance_km.unwrap_or(defaults.max_distance_km),
            limit: self.limit.unwrap_or(defaults.limit),
            page: self.page.unwrap_or(defaults.page),
        })
    }
}

// --- GET /profiles ---

pub async fn candidate_feed<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> AppResult<Json<ApiResponse<Vec<Candidate>>>> {
    let filters = query.into_filters()?;

    let feed = blocking(&state, move |s| {
        feed::fetch_candidates(&s.store, user.id, &filters, s.config.feed_max_limit)
    })
    .await?;

    Ok(Json(ApiResponse::ok(feed)))
}

// --- GET /likes/received ---

pub async fn received_likes<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
) -> AppResult<Json<ApiResponse<Vec<ProfileCard>>>> {
    let likers = blocking(&state, move |s| discovery::received_likes(&s.store, user.id)).await?;
    Ok(Json(ApiResponse::ok(likers)))
}

// --- GET /sent ---

pub async fn sent_likes<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
) -> AppResult<Json<ApiResponse<Vec<ProfileCard>>>> {
    let liked = blocking(&state, move |s| discovery::sent_likes(&s.store, user.id)).await?;
    Ok(Json(ApiResponse::ok(liked)))
}

// --- POST /:id/like ---

pub async fn like<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(target_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<LikeOutcome>>> {
    let outcome = blocking(&state, move |s| discovery::like(&s.store, user.id, target_id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

// --- POST /:id/skip ---

pub async fn skip<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(target_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    blocking(&state, move |s| discovery::skip(&s.store, user.id, target_id)).await?;
    Ok(Json(ApiResponse::ok_with_message((), "profile skipped")))
}

// --- POST /:id/view ---

pub async fn view<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(target_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    blocking(&state, move |s| discovery::record_view(&s.store, user.id, target_id)).await?;
    Ok(Json(ApiResponse::ok_with_message((), "profile viewed")))
}

// --- POST /likes/decline/:id ---

pub async fn decline_like<S: DiscoveryStore + 'static>(
    user: AuthUser,
    State(state): State<Arc<AppState<S>>>,
    ApiPath(liker_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<DeclineOutcome>>> {
    let outcome = blocking(&state, move |s| discovery::decline_like(&s.store, user.id, liker_id)).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}
