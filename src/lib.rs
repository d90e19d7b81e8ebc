//! # QUANTA
//!
//! A multi-user chat and file-transfer server speaking a length-prefixed
//! binary protocol over TCP, secured by a post-quantum key exchange and
//! authenticated symmetric encryption. Clients authenticate against a
//! persistent user store, join named rooms, exchange text messages with
//! durable archival, and move opaque files in 32 KiB chunks; message
//! history is synchronized on demand.
//!
//! ## Modules
//!
//! - [`core`]: configuration, constants, and the error taxonomy
//! - [`wire`]: length-prefixed frame codec and typed packet payloads
//! - [`crypto`]: KEM handshake, identity signatures, session AEAD, KDF
//! - [`store`]: SQL repository seam, per-worker database map, blob store
//! - [`server`]: worker pool, presence registry, per-connection engine
//!
//! ## Protocol sketch
//!
//! ```text
//! client                                server
//!   |  <--- ServerKeyExchange ------------|   signed ephemeral KEM key
//!   |  ---- ClientKeyExchange --------->  |   KEM ciphertext
//!   |  ==== everything below encrypted == |   XChaCha20-Poly1305
//!   |  ---- RtAuthorization ----------->  |
//!   |  <--- ReAuthorization, Established -|
//!   |  ---- RtRoom / Message / RtUpload > |
//!   |  <--- fan-out, chunks, Ping ------- |
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod crypto;
pub mod server;
pub mod store;
pub mod wire;

pub use crate::core::config::ServerConfig;
pub use crate::core::error::{CryptoError, EngineError, ServerError, StoreError, WireError};
