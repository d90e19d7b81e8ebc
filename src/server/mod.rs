//! Server runtime: worker pool, presence registry, transfer engine, and the
//! per-connection protocol engine.

pub mod connection;
pub mod registry;
pub mod transfer;
pub mod workers;

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::core::{DISCONNECT_TIMEOUT, PING_INTERVAL, ServerError};
use crate::crypto::ServerIdentity;
use crate::store::{BlobStore, Database};

pub use connection::run as run_connection;
pub use registry::{Command, PeerHandle, Registry};
pub use transfer::{TransferProgress, TransferTable};
pub use workers::{Worker, WorkerPool};

/// Liveness timer configuration.
///
/// Production uses the protocol values; tests shrink them to drive timeouts
/// quickly.
#[derive(Debug, Clone, Copy)]
pub struct Timers {
    /// Interval between server pings.
    pub ping_interval: std::time::Duration,
    /// Grace period for the matching pong.
    pub disconnect_timeout: std::time::Duration,
}

impl Default for Timers {
    fn default() -> Self {
        Self { ping_interval: PING_INTERVAL, disconnect_timeout: DISCONNECT_TIMEOUT }
    }
}

/// State shared by every connection, created once at startup.
pub struct Shared {
    /// Server display name, sent in `Established`.
    pub name: String,
    /// Message of the day, sent in `Established`.
    pub motd: String,
    /// Long-term signature identity.
    pub identity: ServerIdentity,
    /// Presence registry.
    pub registry: Registry,
    /// Blob directory.
    pub blobs: BlobStore,
    /// Liveness timers.
    pub timers: Timers,
}

/// Accept connections forever, binding each to the least-loaded worker.
///
/// The accepted socket is re-registered with the worker's own runtime, so
/// all of its I/O and timers run there; the worker also opens (or reuses)
/// its database connection before the protocol engine starts.
pub async fn serve(
    listener: TcpListener,
    shared: Arc<Shared>,
    workers: WorkerPool,
    db: Arc<Database>,
) -> Result<(), ServerError> {
    info!("server started listening and is waiting for new connections");

    loop {
        let (stream, addr) = listener.accept().await?;
        let std_stream = stream.into_std()?;

        let worker = workers.least_loaded();
        let index = worker.index();
        let shared = shared.clone();
        let db = db.clone();

        worker.spawn(async move {
            let stream = match TcpStream::from_std(std_stream) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("[{addr}]: failed to adopt connection: {e}");
                    return;
                }
            };
            let repo = match db.repository(index).await {
                Ok(repo) => repo,
                Err(e) => {
                    error!("[{addr}]: database unavailable: {e}");
                    return;
                }
            };

            connection::run(stream, addr.to_string(), shared, repo).await;
        });
    }
}
