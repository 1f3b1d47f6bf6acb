use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use roombook::compactor;
use roombook::config::Config;
use roombook::engine::{Engine, WalStore};
use roombook::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    roombook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(WalStore::open(&config.wal_path())?);
    let engine = Arc::new(Engine::new(store.clone()));

    let seeded = engine.seed_rooms(&config.seed_rooms).await?;
    for room in &seeded {
        info!("seeded room {} ({})", room.name, room.id);
    }

    let compactor = tokio::spawn(compactor::run_compactor(
        store.clone(),
        engine.clone(),
        config.compact_threshold,
    ));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("roombook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {}", config.max_connections);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };

    server::serve(listener, engine, config.max_connections, shutdown).await;

    compactor.abort();
    if let Err(e) = store.compact().await {
        tracing::error!("final WAL compaction failed: {e}");
    }

    info!("roombook stopped");
    Ok(())
}
