use std::sync::Arc;

use kindred_discovery::config::AppConfig;
use kindred_discovery::store::PgStore;
use kindred_discovery::AppState;
use kindred_shared::clients::db::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kindred_shared::middleware::init_tracing("kindred-discovery");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    let metrics_handle = kindred_shared::middleware::init_metrics()?;

    let state = Arc::new(AppState {
        store: PgStore::new(pool),
        config,
        metrics_handle,
    });

    let app = kindred_discovery::app(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "kindred-discovery starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
