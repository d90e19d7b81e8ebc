//! Error types for the QUANTA server.
//!
//! The taxonomy follows the connection engine's fault classes: wire faults
//! and protocol faults are fatal to a connection, crypto faults are fatal
//! without notification, store faults either map to an expected error
//! response or close the connection, and bootstrap faults are fatal to the
//! process.

use thiserror::Error;

/// Errors from the framed codec and payload serialization.
#[derive(Debug, Error)]
pub enum WireError {
    /// Unknown packet type byte.
    #[error("unknown packet type: 0x{0:02x}")]
    UnknownType(u8),

    /// Packet type is not valid coming from this end of the connection.
    #[error("packet type 0x{0:02x} is not valid from this origin")]
    WrongOrigin(u8),

    /// Payload ended before all fields were read.
    #[error("payload ends unexpectedly")]
    UnexpectedEof,

    /// Payload contained bytes past the last field.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// An enum field carried a value outside its range.
    #[error("invalid value {value} for {field}")]
    InvalidDiscriminant {
        /// Field name.
        field: &'static str,
        /// The value received.
        value: u32,
    },

    /// A text field was not valid UTF-8.
    #[error("text field is not valid utf-8")]
    InvalidText,

    /// A length field exceeded the remaining payload.
    #[error("length field exceeds payload")]
    BadLength,

    /// Payload does not fit the `u16` frame length field.
    #[error("payload too large for a frame: {0} bytes")]
    Oversize(usize),
}

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material had the wrong shape for the algorithm.
    #[error("malformed key material")]
    BadKeyMaterial,

    /// KEM encapsulation failed.
    #[error("key encapsulation failed")]
    EncapsulationFailed,

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Signature did not verify.
    #[error("signature verification failed")]
    BadSignature,

    /// Password key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Errors from the repository and the blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The client-supplied message id already exists in the archive.
    #[error("duplicate message id")]
    DuplicateMessageId,

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Blob I/O error.
    #[error("blob i/o error: {0}")]
    Blob(#[from] std::io::Error),
}

/// Why a connection was closed.
///
/// Every variant is terminal for the connection that produced it; the engine
/// logs the reason and tears the connection down.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Wire fault.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Cryptographic fault.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Repository or blob fault on a per-request path.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Socket fault.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the protocol.
    #[error("{0}")]
    Protocol(&'static str),
}

/// Bootstrap-phase errors; all of them are fatal to the process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration file missing, unreadable, or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (certificate file, blob directory, listener).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Database unreachable or schema bootstrap failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Long-term key material unusable.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
