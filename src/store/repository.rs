//! Repository abstraction over the relational store.
//!
//! The engine only sees this trait; the production implementation speaks
//! PostgreSQL, and [`MemoryRepository`] backs the integration tests. Rooms
//! are provisioned out-of-band and read-only here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::{PgConnection, Row};

use crate::core::StoreError;

/// Stored credentials for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// PBKDF2 output.
    pub derived: Vec<u8>,
    /// Per-user salt.
    pub salt: Vec<u8>,
}

/// One provisioned room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Opaque room id.
    pub id: Vec<u8>,
    /// Display name.
    pub name: String,
}

/// One archived message. The serial archive id stays inside the store;
/// replay order is exposed through [`Repository::messages_after`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedMessage {
    /// Server timestamp, seconds since epoch.
    pub timestamp: i64,
    /// Client-supplied message id, globally unique.
    pub id_message: Vec<u8>,
    /// Room the message was sent to.
    pub id_room: Vec<u8>,
    /// Authenticated sender.
    pub id_sender: String,
    /// Message text.
    pub content: String,
}

/// The persistence seam of the connection engine.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Look up a user's stored credentials.
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create a user.
    async fn insert_user(
        &self,
        username: &str,
        derived: &[u8],
        salt: &[u8],
    ) -> Result<(), StoreError>;

    /// Every provisioned room.
    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Whether a room exists.
    async fn room_exists(&self, id: &[u8]) -> Result<bool, StoreError>;

    /// Append a message to the archive.
    ///
    /// Fails with [`StoreError::DuplicateMessageId`] when the client message
    /// id is already archived.
    async fn archive_message(&self, message: &ArchivedMessage) -> Result<(), StoreError>;

    /// All messages in `room` archived strictly after the message with the
    /// given client id, in ascending archive order. An unknown `last_seen`
    /// yields nothing.
    async fn messages_after(
        &self,
        last_seen: &[u8],
        room: &[u8],
    ) -> Result<Vec<ArchivedMessage>, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

/// PostgreSQL-backed repository over one worker-owned connection.
///
/// The connection is behind an async mutex: a worker's connections share it
/// and their queries serialize, which matches the engine's one-query-at-a-
/// time handler model.
pub struct PgRepository {
    conn: Arc<tokio::sync::Mutex<PgConnection>>,
}

impl PgRepository {
    /// Wrap an open connection.
    pub fn new(conn: PgConnection) -> Self {
        Self { conn: Arc::new(tokio::sync::Mutex::new(conn)) }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query("SELECT DERIVED, SALT FROM USERS WHERE USERNAME = $1")
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(match row {
            Some(row) => Some(UserRecord { derived: row.try_get(0)?, salt: row.try_get(1)? }),
            None => None,
        })
    }

    async fn insert_user(
        &self,
        username: &str,
        derived: &[u8],
        salt: &[u8],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        sqlx::query("INSERT INTO USERS (USERNAME, DERIVED, SALT) VALUES ($1, $2, $3)")
            .bind(username)
            .bind(derived)
            .bind(salt)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query("SELECT ID, NAME FROM ROOMS")
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter()
            .map(|row| Ok(Room { id: row.try_get(0)?, name: row.try_get(1)? }))
            .collect()
    }

    async fn room_exists(&self, id: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query("SELECT 1 FROM ROOMS WHERE ID = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    async fn archive_message(&self, message: &ArchivedMessage) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(
            "INSERT INTO ARCHIVE (TIMESTAMP, ID_MESSAGE, ID_ROOM, ID_SENDER, CONTENT) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.timestamp)
        .bind(&message.id_message)
        .bind(&message.id_room)
        .bind(&message.id_sender)
        .bind(&message.content)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateMessageId)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn messages_after(
        &self,
        last_seen: &[u8],
        room: &[u8],
    ) -> Result<Vec<ArchivedMessage>, StoreError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT TIMESTAMP, ID_MESSAGE, ID_ROOM, ID_SENDER, CONTENT FROM ARCHIVE \
             WHERE ID > (SELECT ID FROM ARCHIVE WHERE ID_MESSAGE = $1) \
             AND ID_ROOM = $2 ORDER BY ID",
        )
        .bind(last_seen)
        .bind(room)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ArchivedMessage {
                    timestamp: row.try_get(0)?,
                    id_message: row.try_get(1)?,
                    id_room: row.try_get(2)?,
                    id_sender: row.try_get(3)?,
                    content: row.try_get(4)?,
                })
            })
            .collect()
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// In-memory repository used by the integration tests.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserRecord>,
    rooms: Vec<Room>,
    archive: Vec<ArchivedMessage>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a room, standing in for out-of-band provisioning.
    pub fn add_room(&self, id: Vec<u8>, name: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.rooms.push(Room { id, name: name.into() });
    }

    /// Snapshot of the archive, in insertion order.
    pub fn archived(&self) -> Vec<ArchivedMessage> {
        self.state.lock().unwrap().archive.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.state.lock().unwrap().users.get(username).cloned())
    }

    async fn insert_user(
        &self,
        username: &str,
        derived: &[u8],
        salt: &[u8],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.users.insert(
            username.to_owned(),
            UserRecord { derived: derived.to_vec(), salt: salt.to_vec() },
        );
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.state.lock().unwrap().rooms.clone())
    }

    async fn room_exists(&self, id: &[u8]) -> Result<bool, StoreError> {
        Ok(self.state.lock().unwrap().rooms.iter().any(|r| r.id == id))
    }

    async fn archive_message(&self, message: &ArchivedMessage) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.archive.iter().any(|m| m.id_message == message.id_message) {
            return Err(StoreError::DuplicateMessageId);
        }
        state.archive.push(message.clone());
        Ok(())
    }

    async fn messages_after(
        &self,
        last_seen: &[u8],
        room: &[u8],
    ) -> Result<Vec<ArchivedMessage>, StoreError> {
        let state = self.state.lock().unwrap();
        let position = state.archive.iter().position(|m| m.id_message == last_seen);

        Ok(match position {
            Some(position) => state.archive[position + 1..]
                .iter()
                .filter(|m| m.id_room == room)
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }
}
