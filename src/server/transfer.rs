//! Per-connection file-transfer table.
//!
//! Maps transfer ids to open blob handles and enforces the chunk-flow
//! invariants: chunks are non-empty, never exceed the bytes remaining, and
//! flow in the direction the transfer was opened with. Violations are
//! protocol faults and close the connection.

use std::collections::HashMap;

use crate::core::{EngineError, StoreError};
use crate::store::{BlobHandle, BlobMode};

/// Outcome of writing one inbound chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferProgress {
    /// More bytes remain; the client should send the next chunk.
    Next,
    /// The blob is complete and the handle has been released.
    Completed,
}

/// Active transfers of one connection.
#[derive(Debug, Default)]
pub struct TransferTable {
    active: HashMap<Vec<u8>, BlobHandle>,
}

impl TransferTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transfer with this id is active.
    pub fn contains(&self, id: &[u8]) -> bool {
        self.active.contains_key(id)
    }

    /// Track a newly opened transfer.
    pub fn begin(&mut self, id: Vec<u8>, handle: BlobHandle) {
        self.active.insert(id, handle);
    }

    /// Apply one inbound chunk to a write transfer.
    ///
    /// On completion the handle is released, which keeps the finished blob
    /// on disk.
    pub fn write_chunk(
        &mut self,
        id: &[u8],
        chunk: &[u8],
    ) -> Result<TransferProgress, EngineError> {
        let handle = self
            .active
            .get_mut(id)
            .ok_or(EngineError::Protocol("data for a non-existent file transfer"))?;

        if handle.mode() != BlobMode::Write {
            return Err(EngineError::Protocol("data chunk on an outbound transfer"));
        }
        if chunk.is_empty() {
            return Err(EngineError::Protocol("empty data chunk"));
        }
        if chunk.len() as u64 > handle.remaining() {
            return Err(EngineError::Protocol("more data than required"));
        }

        handle.write_chunk(chunk).map_err(StoreError::Blob)?;

        if handle.at_end() {
            self.active.remove(id);
            Ok(TransferProgress::Completed)
        } else {
            Ok(TransferProgress::Next)
        }
    }

    /// Read the next outbound chunk of a read transfer.
    pub fn read_chunk(&mut self, id: &[u8]) -> Result<Vec<u8>, EngineError> {
        let handle = self
            .active
            .get_mut(id)
            .ok_or(EngineError::Protocol("data for a non-existent file transfer"))?;

        if handle.mode() != BlobMode::Read {
            return Err(EngineError::Protocol("chunk requested on an inbound transfer"));
        }
        if handle.at_end() {
            return Err(EngineError::Protocol("more data requested than available"));
        }

        Ok(handle.read_chunk().map_err(StoreError::Blob)?)
    }

    /// Release a transfer on client request (completed or canceled).
    ///
    /// Dropping an incomplete write handle removes its partial blob.
    pub fn finish(&mut self, id: &[u8]) -> Result<(), EngineError> {
        self.active
            .remove(id)
            .map(drop)
            .ok_or(EngineError::Protocol("data for a non-existent file transfer"))
    }
}
