//! Cryptographic core: KEM handshake material, long-term identity
//! signatures, session AEAD, and password key derivation.

pub mod aead;
pub mod identity;
pub mod kdf;
pub mod kem;

pub use aead::{Sealed, SessionKey, open, seal};
pub use identity::ServerIdentity;
pub use kem::EphemeralKeypair;
