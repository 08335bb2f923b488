mod observability;

use std::sync::Arc;

use ingest_config::loader::load_config;
use ingest_storage::{DeviceDirectory, HistoryStore};
use ingest_store_memory::{MemoryDeviceDirectory, MemoryHistoryStore};
use ingest_supervisor::Supervisor;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1);
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    observability::init_tracing(&config.logging.level);
    tracing::info!(broker = %config.mqtt.broker, workers = config.worker_count(), "starting ingestion pipeline");

    // Backed by the in-memory directory/history implementation until a
    // persistent store client lands (see DESIGN.md).
    let directory: Arc<dyn DeviceDirectory> = MemoryDeviceDirectory::new();
    let history: Arc<dyn HistoryStore> = MemoryHistoryStore::new();

    let client_id = format!("ingest-server-{}", std::process::id());
    let supervisor = Supervisor::new(config, directory, history);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, draining in-flight work");
            let _ = shutdown_tx.send(true);
        }
    });

    supervisor.run(client_id, shutdown_rx).await;
    tracing::info!("ingestion pipeline stopped");
}
