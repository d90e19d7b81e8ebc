//! Long-term server identity.
//!
//! The identity is a post-quantum signature keypair persisted in a single
//! certificate file as `public_key || secret_key`, raw-concatenated. When
//! the file is absent a fresh keypair is generated and written. The server
//! id shown to operators is the SHA3-512 digest of the public key; it plays
//! no protocol role.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use pqcrypto_falcon::falcon512;
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};
use sha3::{Digest, Sha3_512};
use zeroize::Zeroizing;

use crate::core::{CryptoError, HASH_SIZE, ServerError};

/// The server's long-term signature keypair and derived operator id.
pub struct ServerIdentity {
    public: Vec<u8>,
    secret: Zeroizing<Vec<u8>>,
    id: [u8; HASH_SIZE],
}

impl ServerIdentity {
    /// Load the keypair from `path`, generating and persisting a fresh one
    /// when the file does not exist.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();

        let (public, secret) = if path.exists() {
            let raw = Zeroizing::new(fs::read(path)?);
            let public_len = falcon512::public_key_bytes();
            let secret_len = falcon512::secret_key_bytes();
            if raw.len() < public_len + secret_len {
                return Err(ServerError::Crypto(CryptoError::BadKeyMaterial));
            }
            (
                raw[..public_len].to_vec(),
                Zeroizing::new(raw[public_len..public_len + secret_len].to_vec()),
            )
        } else {
            let (public, secret) = falcon512::keypair();
            let public = public.as_bytes().to_vec();
            let secret = Zeroizing::new(secret.as_bytes().to_vec());

            let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
            file.write_all(&public)?;
            file.write_all(&secret)?;

            (public, secret)
        };

        let digest = Sha3_512::digest(&public);
        let mut id = [0u8; HASH_SIZE];
        id.copy_from_slice(&digest);

        Ok(Self { public, secret, id })
    }

    /// The long-term public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// The operator-facing server id, hex-encoded.
    pub fn server_id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Sign a message with the long-term secret key.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let secret = falcon512::SecretKey::from_bytes(&self.secret)
            .map_err(|_| CryptoError::BadKeyMaterial)?;
        Ok(falcon512::detached_sign(message, &secret).as_bytes().to_vec())
    }
}

/// Verify a detached signature under a long-term public key.
///
/// The server never verifies its own signatures; this is the client half,
/// used by the handshake tests.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let public =
        falcon512::PublicKey::from_bytes(public_key).map_err(|_| CryptoError::BadKeyMaterial)?;
    let signature = falcon512::DetachedSignature::from_bytes(signature)
        .map_err(|_| CryptoError::BadSignature)?;

    falcon512::verify_detached_signature(&signature, message, &public)
        .map_err(|_| CryptoError::BadSignature)
}
