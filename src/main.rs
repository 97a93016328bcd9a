use edaparts::library::CadLibraryParser;
use edaparts::router::{EdaPartsState, edaparts_router};
use edaparts::service::{StorableService, StorageLayout, StoreWorker, store_actor};
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &edaparts::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let upload_dir = cfg.upload_dir();
    info!(
        database_url = %cfg.database_url,
        models_base_dir = %cfg.models_base_dir.display(),
        upload_dir = %upload_dir.display(),
        loglevel = %cfg.loglevel,
        lock_timeout_secs = cfg.lock_timeout_secs
    );

    let storage = edaparts::db::StorableStorage::connect(&cfg.database_url).await?;
    let layout = StorageLayout::new(cfg.models_base_dir.clone());
    tokio::fs::create_dir_all(layout.base_dir()).await?;
    tokio::fs::create_dir_all(&upload_dir).await?;
    let parser = Arc::new(CadLibraryParser);

    let worker = StoreWorker::new(
        storage.clone(),
        layout.clone(),
        parser.clone(),
        cfg.lock_timeout(),
    );
    let store = store_actor::spawn(worker).await?;

    let service = StorableService::new(storage, layout, parser, Arc::new(store.clone()));
    let state = EdaPartsState::new(service, upload_dir);
    let app = edaparts_router(state, cfg.max_upload_bytes);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    let pending = store.pending().await.unwrap_or_default();
    if pending > 0 {
        info!(pending, "Store tasks still queued at shutdown");
    }
    store.stop();
    Ok(())
}
