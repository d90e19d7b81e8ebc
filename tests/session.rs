//! End-to-end protocol scenarios.
//!
//! Each test drives the real connection engine over an in-memory duplex
//! stream, with the in-memory repository and a temp-dir blob store standing
//! in for the external collaborators. The client side is a minimal codec
//! harness built from the crate's own wire and crypto layers.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use quanta::crypto::aead::SessionKey;
use quanta::crypto::{self, ServerIdentity, identity, kem};
use quanta::server::{self, Registry, Shared, Timers};
use quanta::store::{BlobStore, MemoryRepository, Repository};
use quanta::wire::packet::{
    AuthError, AuthRequest, AuthResponse, ClientKeyExchange, Message, Ping, PresenceState,
    RoomRequest, RoomResponse, RtAuthorization, RtRoom, RtUpload, Synchronize, TransferError,
    TransferRequest, TransferResponse, TransferState, Upload, UploadState,
};
use quanta::wire::{self, Origin, Packet, PacketType, RawFrame};

const ROOM: &[u8] = &[0x01];

struct TestEnv {
    shared: Arc<Shared>,
    repo: Arc<MemoryRepository>,
    _dir: tempfile::TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_timers(Timers::default())
    }

    fn with_timers(timers: Timers) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let identity = ServerIdentity::load_or_generate(dir.path().join("server.crt")).unwrap();
        let blobs = BlobStore::open(dir.path().join("usershare")).unwrap();

        let repo = Arc::new(MemoryRepository::new());
        repo.add_room(ROOM.to_vec(), "general");

        let shared = Arc::new(Shared {
            name: "test server".into(),
            motd: "welcome".into(),
            identity,
            registry: Registry::new(),
            blobs,
            timers,
        });

        Self { shared, repo, _dir: dir }
    }

    fn blob_path(&self, id: &[u8]) -> std::path::PathBuf {
        self.shared.blobs.path_for(id)
    }
}

struct TestClient {
    stream: DuplexStream,
    buf: BytesMut,
    key: Option<SessionKey>,
    server: JoinHandle<()>,
}

impl TestClient {
    async fn connect(env: &TestEnv) -> Self {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let repo: Arc<dyn Repository> = env.repo.clone();
        let server = tokio::spawn(server::run_connection(
            server_end,
            "127.0.0.1:test".into(),
            env.shared.clone(),
            repo,
        ));

        Self { stream: client_end, buf: BytesMut::new(), key: None, server }
    }

    async fn send(&mut self, packet: Packet) {
        let payload = packet.encode();
        let frame = match &self.key {
            Some(key) if !payload.is_empty() => {
                let sealed = crypto::seal(key, &payload).unwrap();
                RawFrame::sealed(
                    packet.packet_type().as_byte(),
                    sealed.tag,
                    sealed.nonce,
                    sealed.ciphertext,
                )
            }
            _ => RawFrame::plain(packet.packet_type().as_byte(), payload),
        };
        self.stream.write_all(&wire::encode_frame(&frame).unwrap()).await.unwrap();
    }

    /// Receive one packet; `None` once the server closed the connection.
    async fn recv(&mut self) -> Option<Packet> {
        loop {
            if let Some(frame) = wire::try_decode_frame(&mut self.buf, self.key.is_some()) {
                let payload = match (&self.key, &frame.seal) {
                    (Some(key), Some((tag, nonce))) => {
                        crypto::open(key, tag, nonce, &frame.body).unwrap()
                    }
                    _ => frame.body,
                };
                let packet_type = PacketType::from_byte(frame.packet_type).unwrap();
                return Some(Packet::decode(packet_type, Origin::Server, &payload).unwrap());
            }

            if self.stream.read_buf(&mut self.buf).await.unwrap() == 0 {
                return None;
            }
        }
    }

    async fn expect_closed(mut self) {
        loop {
            match timeout(Duration::from_secs(5), self.recv()).await {
                Ok(None) => break,
                Ok(Some(_)) => continue,
                Err(_) => panic!("server did not close the connection"),
            }
        }
        self.server.await.unwrap();
    }

    async fn expect_silence(&mut self) {
        assert!(
            timeout(Duration::from_millis(200), self.recv()).await.is_err(),
            "unexpected packet delivered"
        );
    }

    /// Verify the server key exchange and establish the session key (S1
    /// first half).
    async fn handshake(&mut self) {
        let Some(Packet::ServerKeyExchange(kx)) = self.recv().await else {
            panic!("expected ServerKeyExchange first");
        };
        identity::verify(&kx.sign_public_key, &kx.kem_public_key, &kx.signature).unwrap();

        let (ciphertext, key) = kem::encapsulate(&kx.kem_public_key).unwrap();
        self.send(Packet::ClientKeyExchange(ClientKeyExchange { ciphertext })).await;
        self.key = Some(key);
    }

    async fn authorize(&mut self, username: &str, password: &str, request: AuthRequest) {
        self.send(Packet::RtAuthorization(RtAuthorization {
            username: username.as_bytes().to_vec(),
            password: password.as_bytes().to_vec(),
            request,
        }))
        .await;
    }

    /// Full happy path: handshake, sign-up, and the `Established` hello.
    async fn establish(&mut self, username: &str) {
        self.establish_with(username, AuthRequest::Signup).await;
    }

    /// Authenticate an additional connection of an existing user.
    async fn establish_signin(&mut self, username: &str) {
        self.establish_with(username, AuthRequest::Signin).await;
    }

    async fn establish_with(&mut self, username: &str, request: AuthRequest) {
        self.handshake().await;
        self.authorize(username, "password", request).await;

        match self.recv().await {
            Some(Packet::ReAuthorization(re)) => {
                assert_eq!(re.response, AuthResponse::Authorized);
                assert_eq!(re.error, AuthError::NoError);
            }
            other => panic!("expected ReAuthorization, got {other:?}"),
        }
        match self.recv().await {
            Some(Packet::Established(hello)) => {
                assert_eq!(hello.name, "test server");
                assert_eq!(hello.motd, "welcome");
                assert_eq!(hello.rooms.len(), 1);
                assert_eq!(hello.rooms[0].id, ROOM);
            }
            other => panic!("expected Established, got {other:?}"),
        }
    }

    async fn join(&mut self, room: &[u8]) {
        self.send(Packet::RtRoom(RtRoom { id: room.to_vec(), request: RoomRequest::Join })).await;
        match self.recv().await {
            Some(Packet::ReRoom(re)) => assert_eq!(re.response, RoomResponse::Joined),
            other => panic!("expected ReRoom, got {other:?}"),
        }
    }

    async fn message(&mut self, id: &[u8], content: &str) {
        self.send(Packet::Message(Message {
            timestamp: 0,
            id: id.to_vec(),
            id_sender: String::new(),
            content: content.into(),
        }))
        .await;
    }
}

// =============================================================================
// HANDSHAKE & AUTHORIZATION
// =============================================================================

#[tokio::test]
async fn happy_handshake_and_signup() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;

    // establish() checks the signature, the switch to AEAD framing, and the
    // Authorized/Established sequence.
    client.establish("alice").await;

    // The stored credentials verify against the KDF.
    let record = env.repo.find_user("alice").await.unwrap().unwrap();
    assert_eq!(record.salt.len(), 16);
    let derived = quanta::crypto::kdf::derive_key(b"password", &record.salt).unwrap();
    assert_eq!(derived.to_vec(), record.derived);
}

#[tokio::test]
async fn duplicate_signup_keeps_connection_open() {
    let env = TestEnv::new();

    let mut first = TestClient::connect(&env).await;
    first.establish("alice").await;

    let mut second = TestClient::connect(&env).await;
    second.handshake().await;
    second.authorize("alice", "other", AuthRequest::Signup).await;

    match second.recv().await {
        Some(Packet::ReAuthorization(re)) => {
            assert_eq!(re.response, AuthResponse::ErrorOccurred);
            assert_eq!(re.error, AuthError::UserExists);
        }
        other => panic!("expected ReAuthorization, got {other:?}"),
    }

    // Still in Authenticating: a fresh sign-up on the same connection works.
    second.authorize("bob", "pw", AuthRequest::Signup).await;
    match second.recv().await {
        Some(Packet::ReAuthorization(re)) => assert_eq!(re.response, AuthResponse::Authorized),
        other => panic!("expected ReAuthorization, got {other:?}"),
    }
}

#[tokio::test]
async fn signin_checks_credentials() {
    let env = TestEnv::new();

    let mut signup = TestClient::connect(&env).await;
    signup.establish("alice").await;
    drop(signup);

    let mut client = TestClient::connect(&env).await;
    client.handshake().await;

    client.authorize("mallory", "password", AuthRequest::Signin).await;
    match client.recv().await {
        Some(Packet::ReAuthorization(re)) => assert_eq!(re.error, AuthError::InvalidUsername),
        other => panic!("expected ReAuthorization, got {other:?}"),
    }

    client.authorize("alice", "wrong", AuthRequest::Signin).await;
    match client.recv().await {
        Some(Packet::ReAuthorization(re)) => assert_eq!(re.error, AuthError::InvalidPassword),
        other => panic!("expected ReAuthorization, got {other:?}"),
    }

    client.authorize("alice", "password", AuthRequest::Signin).await;
    match client.recv().await {
        Some(Packet::ReAuthorization(re)) => assert_eq!(re.response, AuthResponse::Authorized),
        other => panic!("expected ReAuthorization, got {other:?}"),
    }
}

#[tokio::test]
async fn operational_packet_before_authorization_is_fatal() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.handshake().await;

    client
        .send(Packet::Synchronize(Synchronize { id_message: vec![0xAA] }))
        .await;
    client.expect_closed().await;
}

// =============================================================================
// ROOMS, FAN-OUT & THE NOTIFY RULE
// =============================================================================

#[tokio::test]
async fn message_fan_out_skips_sender_connection_only() {
    let env = TestEnv::new();

    // Two connections of alice plus one of bob, all in the same room.
    let mut a1 = TestClient::connect(&env).await;
    a1.establish("alice").await;
    a1.join(ROOM).await;

    let mut b = TestClient::connect(&env).await;
    b.establish("bob").await;
    b.join(ROOM).await;
    // bob learns that alice is already present.
    match b.recv().await {
        Some(Packet::UserState(state)) => {
            assert_eq!(state.id, b"alice");
            assert_eq!(state.state, PresenceState::Joined);
        }
        other => panic!("expected UserState, got {other:?}"),
    }
    // alice's first connection learns about bob.
    match a1.recv().await {
        Some(Packet::UserState(state)) => {
            assert_eq!(state.id, b"bob");
            assert_eq!(state.state, PresenceState::Joined);
        }
        other => panic!("expected UserState, got {other:?}"),
    }

    let mut a2 = TestClient::connect(&env).await;
    a2.establish_signin("alice").await;
    a2.join(ROOM).await;
    // The second alice connection sees bob, exactly once.
    match a2.recv().await {
        Some(Packet::UserState(state)) => assert_eq!(state.id, b"bob"),
        other => panic!("expected UserState, got {other:?}"),
    }
    // Nobody is told about alice again: her first connection already kept
    // her present.
    b.expect_silence().await;
    a1.expect_silence().await;

    // S3: alice posts from her first connection.
    a1.message(&[0xAA], "hi").await;

    match a2.recv().await {
        Some(Packet::Message(m)) => {
            assert_eq!(m.id, vec![0xAA]);
            assert_eq!(m.id_sender, "alice");
            assert_eq!(m.content, "hi");
            assert!(m.timestamp > 0, "server must stamp the message");
        }
        other => panic!("expected Message, got {other:?}"),
    }
    match b.recv().await {
        Some(Packet::Message(m)) => assert_eq!(m.content, "hi"),
        other => panic!("expected Message, got {other:?}"),
    }
    // The submitter never gets its own message back.
    a1.expect_silence().await;

    // Archive holds exactly one row for the message id.
    let archived = env.repo.archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id_message, vec![0xAA]);
    assert_eq!(archived[0].id_sender, "alice");
    assert_eq!(archived[0].id_room, ROOM);
}

#[tokio::test]
async fn duplicate_message_id_closes_connection_without_fan_out() {
    let env = TestEnv::new();

    let mut a1 = TestClient::connect(&env).await;
    a1.establish("alice").await;
    a1.join(ROOM).await;

    let mut b = TestClient::connect(&env).await;
    b.establish("bob").await;
    b.join(ROOM).await;
    let _ = b.recv().await; // alice joined
    let _ = a1.recv().await; // bob joined

    a1.message(&[0xAA], "hi").await;
    match b.recv().await {
        Some(Packet::Message(_)) => {}
        other => panic!("expected Message, got {other:?}"),
    }

    // S4: same client message id again.
    a1.message(&[0xAA], "again").await;
    a1.expect_closed().await;

    b.expect_silence().await;
    assert_eq!(env.repo.archived().len(), 1);
}

#[tokio::test]
async fn leave_notifies_only_after_last_connection() {
    let env = TestEnv::new();

    let mut a1 = TestClient::connect(&env).await;
    a1.establish("alice").await;
    a1.join(ROOM).await;

    let mut a2 = TestClient::connect(&env).await;
    a2.establish_signin("alice").await;
    a2.join(ROOM).await;

    let mut b = TestClient::connect(&env).await;
    b.establish("bob").await;
    b.join(ROOM).await;
    match b.recv().await {
        Some(Packet::UserState(state)) => assert_eq!(state.id, b"alice"),
        other => panic!("expected UserState, got {other:?}"),
    }
    let _ = a1.recv().await; // bob joined
    let _ = a2.recv().await; // bob joined

    // First alice connection leaves: another one remains, no notification.
    a1.send(Packet::RtRoom(RtRoom { id: vec![], request: RoomRequest::Leave })).await;
    match a1.recv().await {
        Some(Packet::ReRoom(re)) => assert_eq!(re.response, RoomResponse::Left),
        other => panic!("expected ReRoom, got {other:?}"),
    }
    b.expect_silence().await;

    // Last alice connection leaves: bob is told once.
    a2.send(Packet::RtRoom(RtRoom { id: vec![], request: RoomRequest::Leave })).await;
    match a2.recv().await {
        Some(Packet::ReRoom(re)) => assert_eq!(re.response, RoomResponse::Left),
        other => panic!("expected ReRoom, got {other:?}"),
    }
    match b.recv().await {
        Some(Packet::UserState(state)) => {
            assert_eq!(state.id, b"alice");
            assert_eq!(state.state, PresenceState::Left);
        }
        other => panic!("expected UserState, got {other:?}"),
    }
}

#[tokio::test]
async fn join_of_unknown_room_is_fatal() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    client
        .send(Packet::RtRoom(RtRoom { id: vec![0x7F], request: RoomRequest::Join }))
        .await;
    client.expect_closed().await;
}

#[tokio::test]
async fn synchronize_replays_archive_in_order() {
    let env = TestEnv::new();

    let mut a = TestClient::connect(&env).await;
    a.establish("alice").await;
    a.join(ROOM).await;

    a.message(&[0x01], "one").await;
    a.message(&[0x02], "two").await;
    a.message(&[0x03], "three").await;

    // Wait until all three are archived before the other client syncs.
    timeout(Duration::from_secs(5), async {
        while env.repo.archived().len() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("messages were never archived");

    let mut b = TestClient::connect(&env).await;
    b.establish("bob").await;
    b.join(ROOM).await;
    let _ = b.recv().await; // alice joined
    let _ = a.recv().await; // bob joined

    b.send(Packet::Synchronize(Synchronize { id_message: vec![0x01] })).await;
    match b.recv().await {
        Some(Packet::Message(m)) => assert_eq!(m.content, "two"),
        other => panic!("expected Message, got {other:?}"),
    }
    match b.recv().await {
        Some(Packet::Message(m)) => {
            assert_eq!(m.content, "three");
            assert_eq!(m.id_sender, "alice");
        }
        other => panic!("expected Message, got {other:?}"),
    }
}

#[tokio::test]
async fn synchronize_without_room_is_fatal() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    client.send(Packet::Synchronize(Synchronize { id_message: vec![0x01] })).await;
    client.expect_closed().await;
}

// =============================================================================
// FILE TRANSFERS
// =============================================================================

async fn setup_transfer(client: &mut TestClient, id: &[u8], size: i64, request: TransferRequest) {
    client
        .send(Packet::RtUpload(RtUpload { id: id.to_vec(), size, request }))
        .await;
}

#[tokio::test]
async fn chunked_upload_lands_byte_exact() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    // S5: 70 000 bytes in chunks of 32768, 32768, 4464.
    setup_transfer(&mut client, &[0xF0], 70_000, TransferRequest::Transmit).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => {
            assert_eq!(re.id, vec![0xF0]);
            assert_eq!(re.response, TransferResponse::ReadyRead);
            assert_eq!(re.error, TransferError::NoError);
        }
        other => panic!("expected ReUpload, got {other:?}"),
    }

    let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    let mut expected = vec![TransferState::Next, TransferState::Next, TransferState::Completed]
        .into_iter();
    for chunk in payload.chunks(32_768) {
        client
            .send(Packet::Upload(Upload { id: vec![0xF0], chunk: chunk.to_vec() }))
            .await;
        match client.recv().await {
            Some(Packet::UploadState(state)) => {
                assert_eq!(state.id, vec![0xF0]);
                assert_eq!(state.state, expected.next().unwrap());
            }
            other => panic!("expected UploadState, got {other:?}"),
        }
    }

    let path = env.blob_path(&[0xF0]);
    assert!(path.ends_with("f0"));
    assert_eq!(std::fs::read(&path).unwrap(), payload);
}

#[tokio::test]
async fn interrupted_upload_leaves_no_file() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    setup_transfer(&mut client, &[0xF0], 70_000, TransferRequest::Transmit).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => assert_eq!(re.response, TransferResponse::ReadyRead),
        other => panic!("expected ReUpload, got {other:?}"),
    }

    // S6: two chunks, then the connection drops.
    for _ in 0..2 {
        client
            .send(Packet::Upload(Upload { id: vec![0xF0], chunk: vec![0x5A; 32_768] }))
            .await;
        match client.recv().await {
            Some(Packet::UploadState(state)) => assert_eq!(state.state, TransferState::Next),
            other => panic!("expected UploadState, got {other:?}"),
        }
    }
    assert!(env.blob_path(&[0xF0]).exists());

    let server = client.server;
    drop(client.stream);
    server.await.unwrap();

    assert!(!env.blob_path(&[0xF0]).exists());
}

#[tokio::test]
async fn download_round_trip() {
    let env = TestEnv::new();
    let payload: Vec<u8> = (0..40_000u32).map(|i| (i % 241) as u8).collect();
    std::fs::write(env.blob_path(&[0x0D]), &payload).unwrap();

    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    setup_transfer(&mut client, &[0x0D], payload.len() as i64, TransferRequest::Receive).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => {
            assert_eq!(re.response, TransferResponse::ReadyWrite);
            assert_eq!(re.error, TransferError::NoError);
        }
        other => panic!("expected ReUpload, got {other:?}"),
    }

    let mut received = Vec::new();
    while received.len() < payload.len() {
        client
            .send(Packet::UploadState(UploadState { id: vec![0x0D], state: TransferState::Next }))
            .await;
        match client.recv().await {
            Some(Packet::Upload(upload)) => {
                assert!(!upload.chunk.is_empty());
                assert!(upload.chunk.len() <= 32_768);
                received.extend(upload.chunk);
            }
            other => panic!("expected Upload, got {other:?}"),
        }
    }
    assert_eq!(received, payload);

    client
        .send(Packet::UploadState(UploadState { id: vec![0x0D], state: TransferState::Completed }))
        .await;
    // The blob survives a completed download.
    client.expect_silence().await;
    assert!(env.blob_path(&[0x0D]).exists());
}

#[tokio::test]
async fn transfer_setup_errors_keep_connection_alive() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    // Download of a missing blob.
    setup_transfer(&mut client, &[0x0E], 10, TransferRequest::Receive).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => {
            assert_eq!(re.response, TransferResponse::ErrorOccurred);
            assert_eq!(re.error, TransferError::NotFound);
        }
        other => panic!("expected ReUpload, got {other:?}"),
    }

    // Download with a wrong size claim.
    std::fs::write(env.blob_path(&[0x0D]), [0u8; 10]).unwrap();
    setup_transfer(&mut client, &[0x0D], 11, TransferRequest::Receive).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => assert_eq!(re.error, TransferError::BadRequest),
        other => panic!("expected ReUpload, got {other:?}"),
    }

    // The connection is still operational.
    client.join(ROOM).await;
}

#[tokio::test]
async fn oversize_chunk_is_fatal() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    setup_transfer(&mut client, &[0xF0], 10, TransferRequest::Transmit).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => assert_eq!(re.response, TransferResponse::ReadyRead),
        other => panic!("expected ReUpload, got {other:?}"),
    }

    client
        .send(Packet::Upload(Upload { id: vec![0xF0], chunk: vec![0u8; 11] }))
        .await;
    client.expect_closed().await;
    assert!(!env.blob_path(&[0xF0]).exists());
}

#[tokio::test]
async fn transfer_id_collision_is_fatal() {
    let env = TestEnv::new();
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    setup_transfer(&mut client, &[0xF0], 100, TransferRequest::Transmit).await;
    match client.recv().await {
        Some(Packet::ReUpload(re)) => assert_eq!(re.response, TransferResponse::ReadyRead),
        other => panic!("expected ReUpload, got {other:?}"),
    }

    setup_transfer(&mut client, &[0xF0], 100, TransferRequest::Transmit).await;
    client.expect_closed().await;
}

// =============================================================================
// LIVENESS
// =============================================================================

// The disconnect grace must stay shorter than the ping interval, as in
// production, because every ping re-arms the disconnect timer.
fn short_timers() -> Timers {
    Timers {
        ping_interval: Duration::from_millis(300),
        disconnect_timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn matching_pong_keeps_the_connection_alive() {
    let env = TestEnv::with_timers(short_timers());
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    // Answer two ping rounds; the connection must survive both.
    for _ in 0..2 {
        match client.recv().await {
            Some(Packet::Ping(ping)) => {
                client.send(Packet::Pong(Ping { timestamp: ping.timestamp })).await;
            }
            other => panic!("expected Ping, got {other:?}"),
        }
    }

    client.join(ROOM).await;
}

#[tokio::test]
async fn mismatched_pong_is_fatal() {
    let env = TestEnv::with_timers(short_timers());
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    match client.recv().await {
        Some(Packet::Ping(ping)) => {
            client.send(Packet::Pong(Ping { timestamp: ping.timestamp + 1 })).await;
        }
        other => panic!("expected Ping, got {other:?}"),
    }
    client.expect_closed().await;
}

#[tokio::test]
async fn silent_client_is_disconnected() {
    let env = TestEnv::with_timers(short_timers());
    let mut client = TestClient::connect(&env).await;
    client.establish("alice").await;

    // S7: a ping arrives and is never answered.
    match client.recv().await {
        Some(Packet::Ping(_)) => {}
        other => panic!("expected Ping, got {other:?}"),
    }
    client.expect_closed().await;
}
