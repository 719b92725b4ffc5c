use std::sync::Arc;

use writeoff_sync::{HttpProvider, SyncReconciler};

mod config;
mod error;
mod extract;
mod routes;
mod telemetry;

pub struct AppState {
    pub db: writeoff_storage::DbPool,
    pub reconciler: SyncReconciler,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("writeoff-server", "info");

    let settings = config::Settings::load()?;

    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = writeoff_storage::create_db(&settings.database_path).await?;
    writeoff_storage::seed_default_categories(&db).await?;

    let provider = Arc::new(HttpProvider::new(
        &settings.provider.base_url,
        &settings.provider.client_id,
        &settings.provider.secret,
    ));
    let reconciler = SyncReconciler::new(db.clone(), provider);

    let state = Arc::new(AppState { db, reconciler });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
