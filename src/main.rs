//! Server binary: bootstrap and accept loop.
//!
//! Bootstrap order matches the persisted state: blob directory, long-term
//! identity, configuration, database schema, worker pool, listener. Any
//! failure before the listener is up is fatal to the process.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quanta::core::{BLOB_DIR, CERTIFICATE_FILE, CONFIG_FILE, ServerConfig, ServerError};
use quanta::crypto::ServerIdentity;
use quanta::server::{self, Registry, Shared, Timers, WorkerPool};
use quanta::store::{BlobStore, Database};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(reason) = run().await {
        error!("{reason}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::load(CONFIG_FILE)?;

    let blobs = BlobStore::open(BLOB_DIR)?;
    let identity = ServerIdentity::load_or_generate(CERTIFICATE_FILE)?;
    info!("server id: {}", identity.server_id_hex());

    let db = Database::new(&config);
    db.bootstrap().await.map_err(|e| match e {
        quanta::StoreError::Database(e) => ServerError::Database(e),
        quanta::StoreError::Blob(e) => ServerError::Io(e),
        other => ServerError::Config(other.to_string()),
    })?;

    let workers = WorkerPool::start(
        std::thread::available_parallelism().map(usize::from).unwrap_or(1),
    )?;

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;

    let shared = Arc::new(Shared {
        name: config.name.clone(),
        motd: config.motd.clone(),
        identity,
        registry: Registry::new(),
        blobs,
        timers: Timers::default(),
    });

    tokio::select! {
        result = server::serve(listener, shared, workers, Arc::new(db)) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            Ok(())
        }
    }
}
