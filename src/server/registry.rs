//! Presence registry and cross-connection delivery.
//!
//! Two process-wide multimaps: `connected` (user id → live connections) and
//! `participants` (room id → live connections). Delivery to a peer never
//! touches the peer's state directly; it enqueues a [`Command::Deliver`] on
//! the peer's command channel, and the peer's own worker encrypts and
//! writes. Enqueueing is non-blocking and safe from any thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::wire::Packet;

/// Commands drained by a connection's event loop.
#[derive(Debug)]
pub enum Command {
    /// Encrypt and send a packet produced by a peer connection.
    Deliver(Packet),
}

/// The cross-thread face of one live connection.
pub struct PeerHandle {
    id: u64,
    user: OnceLock<Vec<u8>>,
    tx: mpsc::UnboundedSender<Command>,
}

impl PeerHandle {
    /// Connection id, unique for the process lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The authenticated user, if authentication has completed.
    pub fn user(&self) -> Option<&[u8]> {
        self.user.get().map(Vec::as_slice)
    }

    /// Record the authenticated user. Set exactly once.
    pub fn set_user(&self, user: Vec<u8>) {
        let _ = self.user.set(user);
    }

    /// Enqueue a packet for this connection's worker to send.
    ///
    /// A no-op once the connection is tearing down and its receiver is gone.
    pub fn deliver(&self, packet: Packet) {
        let _ = self.tx.send(Command::Deliver(packet));
    }
}

type Multimap = Mutex<HashMap<Vec<u8>, Vec<Arc<PeerHandle>>>>;

/// Owner of the `connected` and `participants` multimaps.
///
/// Created once at startup and shared; every access serializes on the
/// map-level mutexes, whose critical sections only snapshot or mutate
/// membership.
#[derive(Default)]
pub struct Registry {
    next_id: AtomicU64,
    connected: Multimap,
    participants: Multimap,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the handle for a new connection.
    pub fn new_handle(&self, tx: mpsc::UnboundedSender<Command>) -> Arc<PeerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(PeerHandle { id, user: OnceLock::new(), tx })
    }

    /// Register an authenticated connection under its user id.
    pub fn insert_connected(&self, handle: &Arc<PeerHandle>) {
        let Some(user) = handle.user() else { return };
        self.connected
            .lock()
            .unwrap()
            .entry(user.to_vec())
            .or_default()
            .push(handle.clone());
    }

    /// Remove a connection from `connected` on teardown.
    pub fn remove_connected(&self, handle: &PeerHandle) {
        let Some(user) = handle.user() else { return };
        let mut connected = self.connected.lock().unwrap();
        if let Some(handles) = connected.get_mut(user) {
            handles.retain(|h| h.id != handle.id);
            if handles.is_empty() {
                connected.remove(user);
            }
        }
    }

    /// Add a connection to a room's participants.
    pub fn insert_participant(&self, room: &[u8], handle: &Arc<PeerHandle>) {
        self.participants
            .lock()
            .unwrap()
            .entry(room.to_vec())
            .or_default()
            .push(handle.clone());
    }

    /// Remove a connection from a room's participants.
    pub fn remove_participant(&self, room: &[u8], handle: &PeerHandle) {
        let mut participants = self.participants.lock().unwrap();
        if let Some(handles) = participants.get_mut(room) {
            handles.retain(|h| h.id != handle.id);
            if handles.is_empty() {
                participants.remove(room);
            }
        }
    }

    /// Snapshot of a room's participant connections.
    pub fn participants(&self, room: &[u8]) -> Vec<Arc<PeerHandle>> {
        self.participants.lock().unwrap().get(room).cloned().unwrap_or_default()
    }

    /// Whether some other connection of `user` is present in `room`.
    ///
    /// This is the notify rule: presence notifications are per distinct
    /// user, so a join or leave stays silent while another connection of
    /// the same user keeps the user present.
    pub fn user_in_room(&self, room: &[u8], user: &[u8], excluding: u64) -> bool {
        self.participants
            .lock()
            .unwrap()
            .get(room)
            .map(|handles| {
                handles.iter().any(|h| h.id != excluding && h.user() == Some(user))
            })
            .unwrap_or(false)
    }
}
