//! Database bootstrap and the per-worker connection map.
//!
//! Each worker thread holds its own PostgreSQL connection, opened lazily
//! the first time a connection bound to that worker touches the store. The
//! map is owned by [`Database`] and shared across workers; there is no
//! process-global state.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::ConnectOptions;
use sqlx::postgres::PgConnectOptions;
use tokio::sync::RwLock;

use super::repository::PgRepository;
use crate::core::{ServerConfig, StoreError};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS ARCHIVE (\
     ID         SERIAL PRIMARY KEY,\
     TIMESTAMP  BIGINT NOT NULL,\
     ID_MESSAGE BYTEA  NOT NULL UNIQUE,\
     ID_ROOM    BYTEA  NOT NULL,\
     ID_SENDER  TEXT   NOT NULL,\
     CONTENT    TEXT   NOT NULL)",
    "CREATE TABLE IF NOT EXISTS ROOMS (\
     ID   BYTEA NOT NULL UNIQUE,\
     NAME TEXT  NOT NULL UNIQUE)",
    "CREATE TABLE IF NOT EXISTS USERS (\
     USERNAME TEXT  NOT NULL UNIQUE,\
     DERIVED  BYTEA NOT NULL UNIQUE,\
     SALT     BYTEA NOT NULL UNIQUE)",
];

/// Owner of the schema and the worker-indexed connection map.
pub struct Database {
    options: PgConnectOptions,
    workers: RwLock<HashMap<usize, Arc<PgRepository>>>,
}

impl Database {
    /// Build from the server configuration. No connection is opened yet.
    pub fn new(config: &ServerConfig) -> Self {
        Self { options: config.db_options(), workers: RwLock::new(HashMap::new()) }
    }

    /// Open a bootstrap connection and create the schema.
    ///
    /// Called once at startup; failure here is fatal to the process.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        let mut conn = self.options.connect().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut conn).await?;
        }
        Ok(())
    }

    /// The repository for a worker, connecting on first use.
    pub async fn repository(&self, worker: usize) -> Result<Arc<PgRepository>, StoreError> {
        if let Some(repo) = self.workers.read().await.get(&worker) {
            return Ok(repo.clone());
        }

        let mut workers = self.workers.write().await;
        // Another connection on the same worker may have raced us here.
        if let Some(repo) = workers.get(&worker) {
            return Ok(repo.clone());
        }

        let conn = self.options.connect().await?;
        let repo = Arc::new(PgRepository::new(conn));
        workers.insert(worker, repo.clone());
        Ok(repo)
    }
}
