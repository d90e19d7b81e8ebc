//! Per-connection protocol engine.
//!
//! One task per accepted socket, pinned to one worker thread. The task owns
//! the connection outright: framed I/O, the handshake/encryption state
//! machine, packet dispatch, the transfer table, and the two liveness
//! deadlines all live here, so packet handling is serial and lock-free.
//!
//! State machine:
//!
//! ```text
//! PreHandshake --ClientKeyExchange--> Authenticating --RtAuthorization--> Authenticated
//!       |                                  |                                   |
//!       +---------- socket close / protocol violation / crypto fault ---------+
//!                                          |
//!                                     Terminating
//! ```
//!
//! Peers never touch this connection's state; they enqueue
//! [`Command::Deliver`] on the command channel and this task encrypts and
//! writes on its own worker.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::core::{EngineError, StoreError, WireError};
use crate::crypto::{self, EphemeralKeypair, SessionKey, kdf};
use crate::store::{ArchivedMessage, BlobHandle, Repository};
use crate::wire::packet::{
    AuthError, AuthRequest, AuthResponse, ClientKeyExchange, Established, Message, Ping,
    PresenceState, ReAuthorization, ReRoom, ReUpload, RoomEntry, RoomRequest, RoomResponse,
    RtAuthorization, RtRoom, RtUpload, ServerKeyExchange, Synchronize, TransferError,
    TransferRequest, TransferResponse, TransferState, Upload, UploadState, UserState,
};
use crate::wire::{self, Origin, Packet, PacketType, RawFrame};

use super::Shared;
use super::registry::{Command, PeerHandle};
use super::transfer::{TransferProgress, TransferTable};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the client half of the key exchange.
    PreHandshake,
    /// Encrypted, waiting for sign-in or sign-up.
    Authenticating,
    /// Fully established; operational packets accepted.
    Authenticated,
}

/// What woke the event loop.
enum Event {
    /// Bytes (or EOF) from the socket.
    Read(usize),
    /// A command from a peer connection.
    Command(Option<Command>),
    /// A timer deadline elapsed.
    Deadline,
}

/// Drive one connection to completion.
///
/// Runs until the peer disconnects or a fault tears the connection down;
/// the close reason is logged, never sent to the peer.
pub async fn run<S>(stream: S, peer: String, shared: Arc<Shared>, repo: Arc<dyn Repository>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = shared.registry.new_handle(tx);

    let mut connection = Connection {
        reader,
        writer,
        buf: BytesMut::with_capacity(8 * 1024),
        peer,
        shared,
        repo,
        handle,
        rx,
        phase: Phase::PreHandshake,
        ephemeral: None,
        cipher: None,
        user: None,
        room: None,
        transfers: TransferTable::new(),
        ping_timestamp: 0,
        ping_deadline: Instant::now(),
        disconnect_deadline: None,
    };

    match connection.serve().await {
        Ok(()) => debug!("[{}]: disconnected", connection.display_name()),
        Err(reason) => warn!("[{}]: {}", connection.display_name(), reason),
    }

    connection.teardown();
}

struct Connection<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    buf: BytesMut,
    peer: String,

    shared: Arc<Shared>,
    repo: Arc<dyn Repository>,
    handle: Arc<PeerHandle>,
    rx: mpsc::UnboundedReceiver<Command>,

    phase: Phase,
    ephemeral: Option<EphemeralKeypair>,
    cipher: Option<SessionKey>,
    user: Option<String>,
    room: Option<Vec<u8>>,
    transfers: TransferTable,

    ping_timestamp: i64,
    ping_deadline: Instant,
    disconnect_deadline: Option<Instant>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    async fn serve(&mut self) -> Result<(), EngineError> {
        self.start_handshake().await?;

        loop {
            while let Some(frame) = wire::try_decode_frame(&mut self.buf, self.cipher.is_some()) {
                self.handle_frame(frame).await?;
            }

            let deadline = self.next_deadline();
            let event = tokio::select! {
                read = self.reader.read_buf(&mut self.buf) => Event::Read(read?),
                command = self.rx.recv() => Event::Command(command),
                _ = time::sleep_until(deadline) => Event::Deadline,
            };

            match event {
                Event::Read(0) => {
                    // Peer closed: drain the frames already buffered, then
                    // let the caller tear everything down.
                    while let Some(frame) =
                        wire::try_decode_frame(&mut self.buf, self.cipher.is_some())
                    {
                        self.handle_frame(frame).await?;
                    }
                    return Ok(());
                }
                Event::Read(_) => {}
                Event::Command(Some(Command::Deliver(packet))) => self.send(&packet).await?,
                Event::Command(None) => {}
                Event::Deadline => self.on_deadline().await?,
            }
        }
    }

    /// Mint the ephemeral keypair, sign it, and offer it to the client.
    async fn start_handshake(&mut self) -> Result<(), EngineError> {
        let keypair = EphemeralKeypair::generate();
        let signature = self.shared.identity.sign(keypair.public_key())?;

        self.send(&Packet::ServerKeyExchange(ServerKeyExchange {
            sign_public_key: self.shared.identity.public_key().to_vec(),
            kem_public_key: keypair.public_key().to_vec(),
            signature,
        }))
        .await?;

        self.ephemeral = Some(keypair);
        self.ping_deadline = Instant::now() + self.shared.timers.ping_interval;
        Ok(())
    }

    async fn handle_frame(&mut self, frame: RawFrame) -> Result<(), EngineError> {
        let payload = match (&self.cipher, &frame.seal) {
            (Some(key), Some((tag, nonce))) => crypto::open(key, tag, nonce, &frame.body)?,
            _ => frame.body,
        };

        let packet_type = PacketType::from_byte(frame.packet_type)
            .ok_or(WireError::UnknownType(frame.packet_type))?;
        let packet = Packet::decode(packet_type, Origin::Client, &payload)?;

        match self.phase {
            Phase::PreHandshake => match packet {
                Packet::ClientKeyExchange(d) => self.on_client_key_exchange(d),
                _ => Err(EngineError::Protocol("unexpected packet before key exchange")),
            },
            Phase::Authenticating => match packet {
                Packet::RtAuthorization(d) => self.on_authorization(d).await,
                _ => Err(EngineError::Protocol("unexpected packet before authorization")),
            },
            Phase::Authenticated => match packet {
                Packet::Synchronize(d) => self.on_synchronize(d).await,
                Packet::Message(d) => self.on_message(d).await,
                Packet::RtRoom(d) => self.on_room(d).await,
                Packet::RtUpload(d) => self.on_transfer_setup(d).await,
                Packet::Upload(d) => self.on_chunk(d).await,
                Packet::UploadState(d) => self.on_transfer_state(d).await,
                Packet::Pong(d) => self.on_pong(d),
                _ => Err(EngineError::Protocol("unexpected packet type for state")),
            },
        }
    }

    // =========================================================================
    // HANDSHAKE & AUTHORIZATION
    // =========================================================================

    fn on_client_key_exchange(&mut self, d: ClientKeyExchange) -> Result<(), EngineError> {
        let keypair = self
            .ephemeral
            .take()
            .ok_or(EngineError::Protocol("repeated key exchange"))?;

        // The ephemeral secret is zeroized inside decapsulation; from here
        // on the session key is the only secret this connection holds.
        self.cipher = Some(keypair.decapsulate(&d.ciphertext)?);
        self.phase = Phase::Authenticating;
        Ok(())
    }

    async fn on_authorization(&mut self, d: RtAuthorization) -> Result<(), EngineError> {
        let username = String::from_utf8(d.username)
            .map_err(|_| EngineError::Protocol("username is not valid utf-8"))?;

        match self.repo.find_user(&username).await? {
            Some(record) => match d.request {
                AuthRequest::Signin => {
                    let derived = kdf::derive_key(&d.password, &record.salt)?;
                    if derived[..] != record.derived[..] {
                        return self.refuse_authorization(AuthError::InvalidPassword).await;
                    }
                }
                AuthRequest::Signup => {
                    return self.refuse_authorization(AuthError::UserExists).await;
                }
            },
            None => match d.request {
                AuthRequest::Signin => {
                    return self.refuse_authorization(AuthError::InvalidUsername).await;
                }
                AuthRequest::Signup => {
                    let salt = kdf::generate_salt();
                    let derived = kdf::derive_key(&d.password, &salt)?;
                    self.repo.insert_user(&username, &derived, &salt).await?;
                }
            },
        }

        self.handle.set_user(username.clone().into_bytes());
        self.shared.registry.insert_connected(&self.handle);
        self.user = Some(username);
        self.phase = Phase::Authenticated;

        self.send(&Packet::ReAuthorization(ReAuthorization {
            response: AuthResponse::Authorized,
            error: AuthError::NoError,
        }))
        .await?;

        let rooms = self
            .repo
            .list_rooms()
            .await?
            .into_iter()
            .map(|room| RoomEntry { id: room.id, name: room.name })
            .collect();

        self.send(&Packet::Established(Established {
            name: self.shared.name.clone(),
            motd: self.shared.motd.clone(),
            rooms,
        }))
        .await
    }

    async fn refuse_authorization(&mut self, error: AuthError) -> Result<(), EngineError> {
        self.send(&Packet::ReAuthorization(ReAuthorization {
            response: AuthResponse::ErrorOccurred,
            error,
        }))
        .await
    }

    // =========================================================================
    // MESSAGES & SYNCHRONIZATION
    // =========================================================================

    async fn on_message(&mut self, d: Message) -> Result<(), EngineError> {
        let room = self
            .room
            .clone()
            .ok_or(EngineError::Protocol("client sent a message without being in any room"))?;
        let sender = self.user_name()?;

        // The client's timestamp and sender are untrusted; overwrite both.
        let archived = ArchivedMessage {
            timestamp: epoch_seconds(),
            id_message: d.id.clone(),
            id_room: room.clone(),
            id_sender: sender.clone(),
            content: d.content.clone(),
        };

        match self.repo.archive_message(&archived).await {
            Ok(()) => {}
            Err(StoreError::DuplicateMessageId) => {
                return Err(EngineError::Protocol(
                    "a message with the same id is already archived",
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let packet = Packet::Message(Message {
            timestamp: archived.timestamp,
            id: d.id,
            id_sender: sender,
            content: d.content,
        });

        for peer in self.shared.registry.participants(&room) {
            if peer.id() != self.handle.id() {
                peer.deliver(packet.clone());
            }
        }
        Ok(())
    }

    async fn on_synchronize(&mut self, d: Synchronize) -> Result<(), EngineError> {
        let room = self.room.clone().ok_or(EngineError::Protocol(
            "client requested synchronization without being in any room",
        ))?;

        for archived in self.repo.messages_after(&d.id_message, &room).await? {
            self.send(&Packet::Message(Message {
                timestamp: archived.timestamp,
                id: archived.id_message,
                id_sender: archived.id_sender,
                content: archived.content,
            }))
            .await?;
        }
        Ok(())
    }

    // =========================================================================
    // ROOMS & PRESENCE
    // =========================================================================

    async fn on_room(&mut self, d: RtRoom) -> Result<(), EngineError> {
        match d.request {
            RoomRequest::Join => {
                if !self.repo.room_exists(&d.id).await? {
                    return Err(EngineError::Protocol(
                        "client wants to enter a non-existent room",
                    ));
                }

                if self.room.is_some() {
                    self.leave_room()?;
                }

                self.room = Some(d.id.clone());
                self.send(&Packet::ReRoom(ReRoom { response: RoomResponse::Joined })).await?;

                let user = self.user_id()?;
                let registry = &self.shared.registry;
                let notify = !registry.user_in_room(&d.id, &user, self.handle.id());
                let peers = registry.participants(&d.id);

                // The joiner learns each distinct other user once; each peer
                // connection of those users learns about the joiner only when
                // no other connection already kept this user present.
                let mut announced: Vec<Vec<u8>> = Vec::new();
                for peer in peers {
                    let Some(peer_user) = peer.user().map(<[u8]>::to_vec) else { continue };
                    if peer_user == user {
                        continue;
                    }
                    if !announced.contains(&peer_user) {
                        announced.push(peer_user.clone());
                        self.send(&Packet::UserState(UserState {
                            id: peer_user,
                            state: PresenceState::Joined,
                        }))
                        .await?;
                    }
                    if notify {
                        peer.deliver(Packet::UserState(UserState {
                            id: user.clone(),
                            state: PresenceState::Joined,
                        }));
                    }
                }

                self.shared.registry.insert_participant(&d.id, &self.handle);
                Ok(())
            }
            RoomRequest::Leave => {
                if self.room.is_none() {
                    return Err(EngineError::Protocol(
                        "client wants to leave the room without being in any room",
                    ));
                }
                self.leave_room()?;
                self.send(&Packet::ReRoom(ReRoom { response: RoomResponse::Left })).await
            }
        }
    }

    /// Remove this connection from its room, notifying peers when no other
    /// connection of the same user remains there. Self-removal comes first
    /// so the notify check sees the post-leave state.
    fn leave_room(&mut self) -> Result<(), EngineError> {
        let room = self
            .room
            .take()
            .ok_or(EngineError::Protocol("client is not in any room"))?;
        let user = self.user_id()?;

        let registry = &self.shared.registry;
        registry.remove_participant(&room, &self.handle);

        if !registry.user_in_room(&room, &user, self.handle.id()) {
            for peer in registry.participants(&room) {
                if peer.user() != Some(user.as_slice()) {
                    peer.deliver(Packet::UserState(UserState {
                        id: user.clone(),
                        state: PresenceState::Left,
                    }));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // FILE TRANSFERS
    // =========================================================================

    async fn on_transfer_setup(&mut self, d: RtUpload) -> Result<(), EngineError> {
        if self.transfers.contains(&d.id) {
            return Err(EngineError::Protocol(
                "a file transfer with the same id is already active",
            ));
        }

        let path = self.shared.blobs.path_for(&d.id);

        match d.request {
            TransferRequest::Receive => {
                if !path.exists() {
                    return self.refuse_transfer(d.id, TransferError::NotFound).await;
                }
                let handle = match BlobHandle::open_read(&path) {
                    Ok(handle) => handle,
                    Err(_) => {
                        return self
                            .refuse_transfer(d.id, TransferError::InternalServerError)
                            .await;
                    }
                };
                if d.size < 0 || handle.size() != d.size as u64 {
                    return self.refuse_transfer(d.id, TransferError::BadRequest).await;
                }

                self.send(&Packet::ReUpload(ReUpload {
                    id: d.id.clone(),
                    response: TransferResponse::ReadyWrite,
                    error: TransferError::NoError,
                }))
                .await?;
                self.transfers.begin(d.id, handle);
                Ok(())
            }
            TransferRequest::Transmit => {
                if d.size < 1 {
                    return Err(EngineError::Protocol(
                        "client wants to send a file with the wrong size",
                    ));
                }
                if path.exists() {
                    return Err(EngineError::Protocol(
                        "client wants to send a file that already exists",
                    ));
                }
                let handle = match BlobHandle::create_write(&path, d.size as u64) {
                    Ok(handle) => handle,
                    Err(_) => {
                        return self
                            .refuse_transfer(d.id, TransferError::InternalServerError)
                            .await;
                    }
                };

                self.send(&Packet::ReUpload(ReUpload {
                    id: d.id.clone(),
                    response: TransferResponse::ReadyRead,
                    error: TransferError::NoError,
                }))
                .await?;
                self.transfers.begin(d.id, handle);
                Ok(())
            }
        }
    }

    async fn refuse_transfer(
        &mut self,
        id: Vec<u8>,
        error: TransferError,
    ) -> Result<(), EngineError> {
        self.send(&Packet::ReUpload(ReUpload {
            id,
            response: TransferResponse::ErrorOccurred,
            error,
        }))
        .await
    }

    async fn on_chunk(&mut self, d: Upload) -> Result<(), EngineError> {
        let state = match self.transfers.write_chunk(&d.id, &d.chunk)? {
            TransferProgress::Completed => TransferState::Completed,
            TransferProgress::Next => TransferState::Next,
        };
        self.send(&Packet::UploadState(UploadState { id: d.id, state })).await
    }

    async fn on_transfer_state(&mut self, d: UploadState) -> Result<(), EngineError> {
        match d.state {
            TransferState::Next => {
                let chunk = self.transfers.read_chunk(&d.id)?;
                self.send(&Packet::Upload(Upload { id: d.id, chunk })).await
            }
            TransferState::Canceled | TransferState::Completed => self.transfers.finish(&d.id),
        }
    }

    // =========================================================================
    // LIVENESS
    // =========================================================================

    fn on_pong(&mut self, d: Ping) -> Result<(), EngineError> {
        if d.timestamp != self.ping_timestamp {
            return Err(EngineError::Protocol("client pong timestamp is invalid"));
        }
        self.disconnect_deadline = None;
        self.ping_deadline = Instant::now() + self.shared.timers.ping_interval;
        Ok(())
    }

    fn next_deadline(&self) -> Instant {
        match self.disconnect_deadline {
            Some(disconnect) => disconnect.min(self.ping_deadline),
            None => self.ping_deadline,
        }
    }

    async fn on_deadline(&mut self) -> Result<(), EngineError> {
        let now = Instant::now();

        if self.disconnect_deadline.is_some_and(|deadline| now >= deadline) {
            return Err(EngineError::Protocol("connection timed out"));
        }

        if now >= self.ping_deadline {
            self.ping_timestamp = epoch_seconds();
            self.send(&Packet::Ping(Ping { timestamp: self.ping_timestamp })).await?;
            self.disconnect_deadline = Some(now + self.shared.timers.disconnect_timeout);
            self.ping_deadline = now + self.shared.timers.ping_interval;
        }
        Ok(())
    }

    // =========================================================================
    // PLUMBING
    // =========================================================================

    /// Encode, seal when the session is encrypted, and write one packet.
    async fn send(&mut self, packet: &Packet) -> Result<(), EngineError> {
        let packet_type = packet.packet_type().as_byte();
        let payload = packet.encode();

        let frame = match &self.cipher {
            Some(key) if !payload.is_empty() => {
                let sealed = crypto::seal(key, &payload)?;
                RawFrame::sealed(packet_type, sealed.tag, sealed.nonce, sealed.ciphertext)
            }
            _ => RawFrame::plain(packet_type, payload),
        };

        self.writer.write_all(&wire::encode_frame(&frame)?).await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn user_name(&self) -> Result<String, EngineError> {
        self.user
            .clone()
            .ok_or(EngineError::Protocol("connection is not authenticated"))
    }

    fn user_id(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.user_name()?.into_bytes())
    }

    fn display_name(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.peer)
    }

    /// Release everything this connection holds in shared state. Dropping
    /// the transfer table afterwards removes any partially written blobs.
    fn teardown(&mut self) {
        if self.room.is_some() {
            let _ = self.leave_room();
        }
        self.shared.registry.remove_connected(&self.handle);
    }
}

fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
