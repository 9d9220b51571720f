use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use kindred_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::store::DiscoveryStore;
use crate::AppState;

/// Health check that probes the store.
pub async fn health_check<S: DiscoveryStore + 'static>(State(state): State<Arc<AppState<S>>>) -> Response {
    let probe_state = Arc::clone(&state);
    let probe = tokio::task::spawn_blocking(move || probe_state.store.ping()).await;

    let check = match probe {
        Ok(Ok(())) => HealthCheck {
            name: "store".to_string(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Ok(Err(e)) => HealthCheck {
            name: "store".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
        Err(e) => HealthCheck {
            name: "store".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(format!("probe task failed: {e}")),
        },
    };

    let response = HealthResponse::healthy("kindred-discovery", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![check]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics<S: DiscoveryStore + 'static>(State(state): State<Arc<AppState<S>>>) -> String {
    state.metrics_handle.render()
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::routes::testing::TestApp;

    #[tokio::test]
    async fn health_reports_store_status_without_auth() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "kindred-discovery");
        assert_eq!(body["checks"][0]["name"], "store");
    }
}
