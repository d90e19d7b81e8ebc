//! Protocol constants.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Session key size (XChaCha20 key, KEM shared secret).
pub const SESSION_KEY_SIZE: usize = 32;

/// SHA3-512 output size (server id, KDF PRF).
pub const HASH_SIZE: usize = 64;

/// PBKDF2 output size stored per user.
pub const DERIVED_KEY_SIZE: usize = 64;

/// Per-user salt size.
pub const SALT_SIZE: usize = 16;

/// PBKDF2-HMAC-SHA3-512 iteration count.
pub const KDF_ROUNDS: u32 = 100_000;

// =============================================================================
// FRAME LAYOUT
// =============================================================================

/// Frame header size (`u8` type + `u16` length).
pub const FRAME_HEADER_SIZE: usize = 3;

/// AEAD overhead carried by an encrypted frame (tag + nonce).
pub const FRAME_CRYPTO_SIZE: usize = AEAD_TAG_SIZE + AEAD_NONCE_SIZE;

/// Largest payload expressible by the `u16` length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

// =============================================================================
// TRANSFERS
// =============================================================================

/// Upper bound on a single file-transfer chunk.
pub const CHUNK_SIZE: u64 = 32_768;

// =============================================================================
// TIMING
// =============================================================================

/// Interval between server pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period for the matching pong before the connection is dropped.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// PERSISTED STATE
// =============================================================================

/// Long-term signature keypair file (`public_key || secret_key`, raw).
pub const CERTIFICATE_FILE: &str = "server.crt";

/// Blob directory for file transfers.
pub const BLOB_DIR: &str = "usershare";

/// Server configuration file.
pub const CONFIG_FILE: &str = "server.toml";
