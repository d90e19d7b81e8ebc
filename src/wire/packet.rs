//! Typed packet payloads and their serialization.
//!
//! Every packet is a tagged record of primitive fields: integers big-endian,
//! byte strings and UTF-8 text prefixed by their `u32` byte length, sequences
//! prefixed by their `u32` element count, enum discriminants as `u32`. There
//! is one struct per packet and an explicit encode/decode arm per type; no
//! runtime type registry.
//!
//! Packet type `0` is shared by the two handshake messages, so decoding is
//! direction-aware: the same byte decodes as [`ClientKeyExchange`] when read
//! by the server and as [`ServerKeyExchange`] when read by a client.

use crate::core::WireError;

/// Packet type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Key exchange, either direction.
    Handshake = 0,
    /// Sign-in / sign-up request.
    RtAuthorization = 1,
    /// Authorization response.
    ReAuthorization = 2,
    /// Post-authorization server hello.
    Established = 3,
    /// Archive replay request.
    Synchronize = 4,
    /// Presence notification.
    UserState = 5,
    /// Chat message.
    Message = 6,
    /// Room join/leave request.
    RtRoom = 7,
    /// Room response.
    ReRoom = 8,
    /// Transfer setup request.
    RtUpload = 9,
    /// Transfer setup response.
    ReUpload = 10,
    /// One transfer chunk.
    Upload = 11,
    /// Transfer flow control.
    UploadState = 12,
    /// Liveness probe.
    Ping = 13,
    /// Liveness reply.
    Pong = 14,
}

impl PacketType {
    /// Parse a packet type from its wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Handshake),
            1 => Some(Self::RtAuthorization),
            2 => Some(Self::ReAuthorization),
            3 => Some(Self::Established),
            4 => Some(Self::Synchronize),
            5 => Some(Self::UserState),
            6 => Some(Self::Message),
            7 => Some(Self::RtRoom),
            8 => Some(Self::ReRoom),
            9 => Some(Self::RtUpload),
            10 => Some(Self::ReUpload),
            11 => Some(Self::Upload),
            12 => Some(Self::UploadState),
            13 => Some(Self::Ping),
            14 => Some(Self::Pong),
            _ => None,
        }
    }

    /// The wire byte for this packet type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Which end of the connection produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Payload written by a client.
    Client,
    /// Payload written by the server.
    Server,
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Server half of the key exchange: the long-term signature public key, a
/// fresh ephemeral KEM public key, and the signature over the latter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    /// Long-term signature public key.
    pub sign_public_key: Vec<u8>,
    /// Ephemeral KEM public key for this connection.
    pub kem_public_key: Vec<u8>,
    /// Signature over `kem_public_key` under `sign_public_key`.
    pub signature: Vec<u8>,
}

/// Client half of the key exchange: the KEM ciphertext encapsulating the
/// session secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    /// KEM ciphertext.
    pub ciphertext: Vec<u8>,
}

/// Kind of authorization requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequest {
    /// Authenticate an existing user.
    Signin,
    /// Create a new user.
    Signup,
}

impl AuthRequest {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Signin),
            1 => Some(Self::Signup),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Sign-in / sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtAuthorization {
    /// Username bytes; must be valid UTF-8.
    pub username: Vec<u8>,
    /// Password bytes; never stored, only fed to the KDF.
    pub password: Vec<u8>,
    /// Requested operation.
    pub request: AuthRequest,
}

/// Authorization outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResponse {
    /// Request rejected; see the error code.
    ErrorOccurred,
    /// Connection is authenticated.
    Authorized,
}

impl AuthResponse {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::ErrorOccurred),
            1 => Some(Self::Authorized),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Authorization error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No error.
    NoError,
    /// Sign-in for a username that does not exist.
    InvalidUsername,
    /// Sign-in with a password that does not match.
    InvalidPassword,
    /// Sign-up for a username that already exists.
    UserExists,
}

impl AuthError {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::NoError),
            1 => Some(Self::InvalidUsername),
            2 => Some(Self::InvalidPassword),
            3 => Some(Self::UserExists),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Authorization response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReAuthorization {
    /// Outcome.
    pub response: AuthResponse,
    /// Error detail, `NoError` on success.
    pub error: AuthError,
}

/// One room in the `Established` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntry {
    /// Opaque room id.
    pub id: Vec<u8>,
    /// Display name.
    pub name: String,
}

/// Server hello sent right after a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    /// Server display name.
    pub name: String,
    /// Message of the day.
    pub motd: String,
    /// Every provisioned room.
    pub rooms: Vec<RoomEntry>,
}

/// Archive replay request: everything after the referenced message, in the
/// requester's current room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synchronize {
    /// Client message id of the last message the client has.
    pub id_message: Vec<u8>,
}

/// Presence change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// User entered the room.
    Joined,
    /// User left the room.
    Left,
}

impl PresenceState {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Joined),
            1 => Some(Self::Left),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Presence notification for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserState {
    /// User id.
    pub id: Vec<u8>,
    /// Joined or left.
    pub state: PresenceState,
}

/// Chat message. On the way in, `timestamp` and `id_sender` are overwritten
/// by the server before archiving and fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server timestamp, seconds since epoch.
    pub timestamp: i64,
    /// Client-supplied message id, globally unique.
    pub id: Vec<u8>,
    /// Sender user id.
    pub id_sender: String,
    /// Message text.
    pub content: String,
}

/// Room operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomRequest {
    /// Enter a room.
    Join,
    /// Leave the current room.
    Leave,
}

impl RoomRequest {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Join),
            1 => Some(Self::Leave),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Room join/leave request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtRoom {
    /// Room id; ignored for `Leave`.
    pub id: Vec<u8>,
    /// Requested operation.
    pub request: RoomRequest,
}

/// Room operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomResponse {
    /// The join took effect.
    Joined,
    /// The leave took effect.
    Left,
}

impl RoomResponse {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Joined),
            1 => Some(Self::Left),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Room response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReRoom {
    /// Outcome.
    pub response: RoomResponse,
}

/// Transfer direction, named from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRequest {
    /// Client downloads an existing blob (server reads).
    Receive,
    /// Client uploads a new blob (server writes).
    Transmit,
}

impl TransferRequest {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Receive),
            1 => Some(Self::Transmit),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Transfer setup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtUpload {
    /// Client-chosen transfer id, unique within the connection.
    pub id: Vec<u8>,
    /// Total size in bytes.
    pub size: i64,
    /// Direction.
    pub request: TransferRequest,
}

/// Transfer setup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResponse {
    /// Setup failed; see the error code.
    ErrorOccurred,
    /// Server is ready to read chunks from the client.
    ReadyRead,
    /// Server is ready to write chunks to the client on request.
    ReadyWrite,
}

impl TransferResponse {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::ErrorOccurred),
            1 => Some(Self::ReadyRead),
            2 => Some(Self::ReadyWrite),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Transfer setup error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// No error.
    NoError,
    /// The blob could not be opened or allocated.
    InternalServerError,
    /// The claimed size does not match the blob on disk.
    BadRequest,
    /// No blob with that id exists.
    NotFound,
}

impl TransferError {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::NoError),
            1 => Some(Self::InternalServerError),
            2 => Some(Self::BadRequest),
            3 => Some(Self::NotFound),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Transfer setup response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReUpload {
    /// Transfer id echoed back.
    pub id: Vec<u8>,
    /// Outcome.
    pub response: TransferResponse,
    /// Error detail, `NoError` on success.
    pub error: TransferError,
}

/// One transfer chunk, at most 32 KiB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Transfer id.
    pub id: Vec<u8>,
    /// Chunk bytes.
    pub chunk: Vec<u8>,
}

/// Transfer flow-control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Request or announce the next chunk.
    Next,
    /// Abandon the transfer.
    Canceled,
    /// All bytes have been moved.
    Completed,
}

impl TransferState {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Next),
            1 => Some(Self::Canceled),
            2 => Some(Self::Completed),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Transfer flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    /// Transfer id.
    pub id: Vec<u8>,
    /// New state.
    pub state: TransferState,
}

/// Liveness probe; the reply must echo the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Seconds since epoch at the sender.
    pub timestamp: i64,
}

// =============================================================================
// PACKET SUM
// =============================================================================

/// One decoded packet: a tag plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Server half of the key exchange.
    ServerKeyExchange(ServerKeyExchange),
    /// Client half of the key exchange.
    ClientKeyExchange(ClientKeyExchange),
    /// Sign-in / sign-up request.
    RtAuthorization(RtAuthorization),
    /// Authorization response.
    ReAuthorization(ReAuthorization),
    /// Post-authorization server hello.
    Established(Established),
    /// Archive replay request.
    Synchronize(Synchronize),
    /// Presence notification.
    UserState(UserState),
    /// Chat message.
    Message(Message),
    /// Room join/leave request.
    RtRoom(RtRoom),
    /// Room response.
    ReRoom(ReRoom),
    /// Transfer setup request.
    RtUpload(RtUpload),
    /// Transfer setup response.
    ReUpload(ReUpload),
    /// One transfer chunk.
    Upload(Upload),
    /// Transfer flow control.
    UploadState(UploadState),
    /// Liveness probe.
    Ping(Ping),
    /// Liveness reply.
    Pong(Ping),
}

impl Packet {
    /// The wire type of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ServerKeyExchange(_) | Packet::ClientKeyExchange(_) => PacketType::Handshake,
            Packet::RtAuthorization(_) => PacketType::RtAuthorization,
            Packet::ReAuthorization(_) => PacketType::ReAuthorization,
            Packet::Established(_) => PacketType::Established,
            Packet::Synchronize(_) => PacketType::Synchronize,
            Packet::UserState(_) => PacketType::UserState,
            Packet::Message(_) => PacketType::Message,
            Packet::RtRoom(_) => PacketType::RtRoom,
            Packet::ReRoom(_) => PacketType::ReRoom,
            Packet::RtUpload(_) => PacketType::RtUpload,
            Packet::ReUpload(_) => PacketType::ReUpload,
            Packet::Upload(_) => PacketType::Upload,
            Packet::UploadState(_) => PacketType::UploadState,
            Packet::Ping(_) => PacketType::Ping,
            Packet::Pong(_) => PacketType::Pong,
        }
    }

    /// Serialize the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        match self {
            Packet::ServerKeyExchange(d) => {
                w.put_bytes(&d.sign_public_key);
                w.put_bytes(&d.kem_public_key);
                w.put_bytes(&d.signature);
            }
            Packet::ClientKeyExchange(d) => {
                w.put_bytes(&d.ciphertext);
            }
            Packet::RtAuthorization(d) => {
                w.put_bytes(&d.username);
                w.put_bytes(&d.password);
                w.put_u32(d.request.as_u32());
            }
            Packet::ReAuthorization(d) => {
                w.put_u32(d.response.as_u32());
                w.put_u32(d.error.as_u32());
            }
            Packet::Established(d) => {
                w.put_text(&d.name);
                w.put_text(&d.motd);
                w.put_u32(d.rooms.len() as u32);
                for room in &d.rooms {
                    w.put_bytes(&room.id);
                    w.put_text(&room.name);
                }
            }
            Packet::Synchronize(d) => {
                w.put_bytes(&d.id_message);
            }
            Packet::UserState(d) => {
                w.put_bytes(&d.id);
                w.put_u32(d.state.as_u32());
            }
            Packet::Message(d) => {
                w.put_i64(d.timestamp);
                w.put_bytes(&d.id);
                w.put_text(&d.id_sender);
                w.put_text(&d.content);
            }
            Packet::RtRoom(d) => {
                w.put_bytes(&d.id);
                w.put_u32(d.request.as_u32());
            }
            Packet::ReRoom(d) => {
                w.put_u32(d.response.as_u32());
            }
            Packet::RtUpload(d) => {
                w.put_bytes(&d.id);
                w.put_i64(d.size);
                w.put_u32(d.request.as_u32());
            }
            Packet::ReUpload(d) => {
                w.put_bytes(&d.id);
                w.put_u32(d.response.as_u32());
                w.put_u32(d.error.as_u32());
            }
            Packet::Upload(d) => {
                w.put_bytes(&d.id);
                w.put_bytes(&d.chunk);
            }
            Packet::UploadState(d) => {
                w.put_bytes(&d.id);
                w.put_u32(d.state.as_u32());
            }
            Packet::Ping(d) | Packet::Pong(d) => {
                w.put_i64(d.timestamp);
            }
        }
        w.into_inner()
    }

    /// Deserialize a payload of the given type, as written by `origin`.
    ///
    /// Types that are never produced by `origin` fail with
    /// [`WireError::WrongOrigin`]; a payload with fields left over fails
    /// with [`WireError::TrailingBytes`].
    pub fn decode(
        packet_type: PacketType,
        origin: Origin,
        payload: &[u8],
    ) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        let packet = match (packet_type, origin) {
            (PacketType::Handshake, Origin::Server) => Packet::ServerKeyExchange(ServerKeyExchange {
                sign_public_key: r.bytes()?,
                kem_public_key: r.bytes()?,
                signature: r.bytes()?,
            }),
            (PacketType::Handshake, Origin::Client) => Packet::ClientKeyExchange(ClientKeyExchange {
                ciphertext: r.bytes()?,
            }),
            (PacketType::RtAuthorization, Origin::Client) => {
                Packet::RtAuthorization(RtAuthorization {
                    username: r.bytes()?,
                    password: r.bytes()?,
                    request: r.discriminant("auth request", AuthRequest::from_u32)?,
                })
            }
            (PacketType::ReAuthorization, Origin::Server) => {
                Packet::ReAuthorization(ReAuthorization {
                    response: r.discriminant("auth response", AuthResponse::from_u32)?,
                    error: r.discriminant("auth error", AuthError::from_u32)?,
                })
            }
            (PacketType::Established, Origin::Server) => {
                let name = r.text()?;
                let motd = r.text()?;
                let count = r.u32()?;
                let mut rooms = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    rooms.push(RoomEntry { id: r.bytes()?, name: r.text()? });
                }
                Packet::Established(Established { name, motd, rooms })
            }
            (PacketType::Synchronize, Origin::Client) => Packet::Synchronize(Synchronize {
                id_message: r.bytes()?,
            }),
            (PacketType::UserState, Origin::Server) => Packet::UserState(UserState {
                id: r.bytes()?,
                state: r.discriminant("presence state", PresenceState::from_u32)?,
            }),
            (PacketType::Message, _) => Packet::Message(Message {
                timestamp: r.i64()?,
                id: r.bytes()?,
                id_sender: r.text()?,
                content: r.text()?,
            }),
            (PacketType::RtRoom, Origin::Client) => Packet::RtRoom(RtRoom {
                id: r.bytes()?,
                request: r.discriminant("room request", RoomRequest::from_u32)?,
            }),
            (PacketType::ReRoom, Origin::Server) => Packet::ReRoom(ReRoom {
                response: r.discriminant("room response", RoomResponse::from_u32)?,
            }),
            (PacketType::RtUpload, Origin::Client) => Packet::RtUpload(RtUpload {
                id: r.bytes()?,
                size: r.i64()?,
                request: r.discriminant("transfer request", TransferRequest::from_u32)?,
            }),
            (PacketType::ReUpload, Origin::Server) => Packet::ReUpload(ReUpload {
                id: r.bytes()?,
                response: r.discriminant("transfer response", TransferResponse::from_u32)?,
                error: r.discriminant("transfer error", TransferError::from_u32)?,
            }),
            (PacketType::Upload, _) => Packet::Upload(Upload {
                id: r.bytes()?,
                chunk: r.bytes()?,
            }),
            (PacketType::UploadState, _) => Packet::UploadState(UploadState {
                id: r.bytes()?,
                state: r.discriminant("transfer state", TransferState::from_u32)?,
            }),
            (PacketType::Ping, _) => Packet::Ping(Ping { timestamp: r.i64()? }),
            (PacketType::Pong, _) => Packet::Pong(Ping { timestamp: r.i64()? }),
            (other, _) => return Err(WireError::WrongOrigin(other.as_byte())),
        };
        r.finish()?;
        Ok(packet)
    }
}

// =============================================================================
// PRIMITIVE SERIALIZATION
// =============================================================================

/// Big-endian payload writer.
struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn put_bytes(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
    }

    fn put_text(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Big-endian payload reader over a borrowed slice.
struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::UnexpectedEof);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn i64(&mut self) -> Result<i64, WireError> {
        let raw = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(i64::from_be_bytes(bytes))
    }

    fn bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        if self.buf.len() < len {
            return Err(WireError::BadLength);
        }
        Ok(self.take(len)?.to_vec())
    }

    fn text(&mut self) -> Result<String, WireError> {
        String::from_utf8(self.bytes()?).map_err(|_| WireError::InvalidText)
    }

    fn discriminant<T>(
        &mut self,
        field: &'static str,
        parse: fn(u32) -> Option<T>,
    ) -> Result<T, WireError> {
        let value = self.u32()?;
        parse(value).ok_or(WireError::InvalidDiscriminant { field, value })
    }

    fn finish(self) -> Result<(), WireError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(WireError::TrailingBytes(self.buf.len()))
        }
    }
}
