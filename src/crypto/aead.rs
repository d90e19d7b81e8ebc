//! XChaCha20-Poly1305 AEAD for the session channel.
//!
//! Every post-handshake frame is sealed with the KEM shared secret as the
//! key and a fresh random 24-byte nonce; the 16-byte Poly1305 tag travels
//! detached in the frame header. No associated data is used.

use chacha20poly1305::{
    Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use zeroize::Zeroize;

use crate::core::{AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CryptoError, SESSION_KEY_SIZE};

/// The session key established by the handshake.
///
/// Zeroized on drop.
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Create a session key from exactly [`SESSION_KEY_SIZE`] bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Create a session key from a shared-secret slice.
    ///
    /// Fails when the slice is shorter than the key; longer secrets are
    /// truncated to the XChaCha20 key size.
    pub fn from_shared_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.len() < SESSION_KEY_SIZE {
            return Err(CryptoError::BadKeyMaterial);
        }
        let mut key = [0u8; SESSION_KEY_SIZE];
        key.copy_from_slice(&secret[..SESSION_KEY_SIZE]);
        Ok(Self { key })
    }

    /// Raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// A sealed payload: detached tag, the nonce it was sealed under, and the
/// ciphertext (same length as the plaintext).
pub struct Sealed {
    /// Poly1305 tag.
    pub tag: [u8; AEAD_TAG_SIZE],
    /// Random per-frame nonce.
    pub nonce: [u8; AEAD_NONCE_SIZE],
    /// Ciphertext.
    pub ciphertext: Vec<u8>,
}

/// Encrypt a payload under a fresh random nonce.
pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), &[], &mut buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; AEAD_TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed { tag: tag_bytes, nonce, ciphertext: buffer })
}

/// Decrypt a payload, verifying its detached tag.
pub fn open(
    key: &SessionKey,
    tag: &[u8; AEAD_TAG_SIZE],
    nonce: &[u8; AEAD_NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(nonce),
            &[],
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(buffer)
}
