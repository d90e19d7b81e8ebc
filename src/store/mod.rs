//! Persistence: the SQL repository seam, the per-worker database map, and
//! the on-disk blob store.

pub mod blob;
pub mod database;
pub mod repository;

pub use blob::{BlobHandle, BlobMode, BlobStore};
pub use database::Database;
pub use repository::{ArchivedMessage, MemoryRepository, PgRepository, Repository, Room, UserRecord};
