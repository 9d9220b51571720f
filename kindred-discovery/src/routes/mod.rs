pub mod discovery;
pub mod health;
pub mod internal;
pub mod matches;
pub mod messages;
pub mod profile;

use std::sync::Arc;

use kindred_shared::errors::{AppError, AppResult};

use crate::error::DiscoveryResult;
use crate::store::DiscoveryStore;
use crate::AppState;

/// Run a synchronous engine call on the blocking pool.
///
/// Once started the call runs to completion even if the request is dropped, so
/// a like transaction always commits or aborts as a whole.
pub(crate) async fn blocking<S, T, F>(state: &Arc<AppState<S>>, f: F) -> AppResult<T>
where
    S: DiscoveryStore + 'static,
    T: Send + 'static,
    F: FnOnce(&AppState<S>) -> DiscoveryResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| AppError::internal(format!("blocking task failed: {e}")))?
        .map_err(AppError::from)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use kindred_shared::middleware::jwt_secret;
    use kindred_shared::types::auth::Claims;

    use crate::config::AppConfig;
    use crate::models::GeoPoint;
    use crate::store::MemoryStore;
    use crate::AppState;

    pub struct TestApp {
        pub router: Router,
        pub state: Arc<AppState<MemoryStore>>,
    }

    impl TestApp {
        pub fn new() -> Self {
            let state = Arc::new(AppState {
                store: MemoryStore::new(),
                config: AppConfig::default(),
                metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
            });
            Self { router: crate::app(Arc::clone(&state)), state }
        }

        pub fn user(&self, name: &str) -> Uuid {
            self.state.store.seed_user(name, Some(30), GeoPoint::new(120.98, 14.6)).id
        }

        pub async fn call(&self, method: Method, uri: &str, caller: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(id) = caller {
                let token = Claims::new(id, 3600).sign(&jwt_secret()).unwrap();
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        pub async fn get(&self, uri: &str, caller: Uuid) -> (StatusCode, Value) {
            self.call(Method::GET, uri, Some(caller), None).await
        }

        pub async fn post(&self, uri: &str, caller: Uuid) -> (StatusCode, Value) {
            self.call(Method::POST, uri, Some(caller), None).await
        }
    }
}
