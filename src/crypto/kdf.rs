//! Password key derivation.
//!
//! PBKDF2-HMAC-SHA3-512, 100 000 iterations, 64-byte output, 16-byte random
//! salt. Only the derived key and the salt are ever stored.

use hmac::Hmac;
use rand::{RngCore, rngs::OsRng};
use sha3::Sha3_512;

use crate::core::{CryptoError, DERIVED_KEY_SIZE, KDF_ROUNDS, SALT_SIZE};

/// Derive the stored key for a password and salt.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; DERIVED_KEY_SIZE], CryptoError> {
    let mut derived = [0u8; DERIVED_KEY_SIZE];
    pbkdf2::pbkdf2::<Hmac<Sha3_512>>(password, salt, KDF_ROUNDS, &mut derived)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(derived)
}

/// Generate a fresh random salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}
