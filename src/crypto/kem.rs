//! Post-quantum key encapsulation for the session handshake.
//!
//! The server mints one ephemeral keypair per connection, signs its public
//! key with the long-term identity, and recovers the session secret from
//! the client's ciphertext. The secret key bytes are zeroized when the
//! keypair is dropped, which happens as soon as decapsulation succeeds.

use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use zeroize::Zeroizing;

use super::aead::SessionKey;
use crate::core::CryptoError;

/// An ephemeral KEM keypair, secret half zeroized on drop.
pub struct EphemeralKeypair {
    public: Vec<u8>,
    secret: Zeroizing<Vec<u8>>,
}

impl EphemeralKeypair {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let (public, secret) = kyber768::keypair();
        Self {
            public: public.as_bytes().to_vec(),
            secret: Zeroizing::new(secret.as_bytes().to_vec()),
        }
    }

    /// The public key to send to the peer.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Recover the session key from the peer's ciphertext.
    ///
    /// Consumes the keypair; the secret half is zeroized on return.
    pub fn decapsulate(self, ciphertext: &[u8]) -> Result<SessionKey, CryptoError> {
        let ciphertext = kyber768::Ciphertext::from_bytes(ciphertext)
            .map_err(|_| CryptoError::BadKeyMaterial)?;
        let secret = kyber768::SecretKey::from_bytes(&self.secret)
            .map_err(|_| CryptoError::BadKeyMaterial)?;

        let shared = kyber768::decapsulate(&ciphertext, &secret);
        SessionKey::from_shared_secret(shared.as_bytes())
    }
}

/// Encapsulate a session key to a peer's ephemeral public key.
///
/// This is the client half of the exchange; the server never calls it.
pub fn encapsulate(public_key: &[u8]) -> Result<(Vec<u8>, SessionKey), CryptoError> {
    let public = kyber768::PublicKey::from_bytes(public_key)
        .map_err(|_| CryptoError::EncapsulationFailed)?;

    let (shared, ciphertext) = kyber768::encapsulate(&public);
    let key = SessionKey::from_shared_secret(shared.as_bytes())?;

    Ok((ciphertext.as_bytes().to_vec(), key))
}
