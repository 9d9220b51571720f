use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod models;
pub mod pair;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

use config::AppConfig;
use store::DiscoveryStore;

pub struct AppState<S> {
    pub store: S,
    pub config: AppConfig,
    pub metrics_handle: PrometheusHandle,
}

pub fn app<S: DiscoveryStore + 'static>(state: Arc<AppState<S>>) -> Router {
    use routes::{discovery, health, internal, matches, messages, profile};

    Router::new()
        .route("/profiles", get(discovery::candidate_feed::<S>))
        .route("/likes/received", get(discovery::received_likes::<S>))
        .route("/likes/decline/:id", post(discovery::decline_like::<S>))
        .route("/sent", get(discovery::sent_likes::<S>))
        .route("/:id/like", post(discovery::like::<S>))
        .route("/:id/skip", post(discovery::skip::<S>))
        .route("/:id/view", post(discovery::view::<S>))
        .route("/matches", get(matches::list_matches::<S>))
        .route("/isMatched/:partner_id", get(matches::is_matched::<S>))
        .route("/unmatch/:partner_id", post(matches::unmatch::<S>))
        .route(
            "/messages/:partner_id",
            get(messages::list_messages::<S>).post(messages::send_message::<S>),
        )
        .route(
            "/messages/item/:message_id",
            patch(messages::edit_message::<S>).delete(messages::delete_message::<S>),
        )
        .route("/me", get(profile::get_profile::<S>).patch(profile::update_profile::<S>))
        // Internal service-to-service endpoints (no auth)
        .route("/internal/users", post(internal::provision_user::<S>))
        .route("/health", get(health::health_check::<S>))
        .route("/metrics", get(health::metrics::<S>))
        .route_layer(middleware::from_fn(kindred_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
