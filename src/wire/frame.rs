//! Length-prefixed frame encoding and decoding.
//!
//! Wire format (all integers big-endian):
//!
//! ```text
//! +--------+----------+----------------------------------+--------------+
//! | Type   | Length   | Tag (16) + Nonce (24)            | Body         |
//! | 1 byte | 2 bytes  | only if encrypted and Length > 0 | Length bytes |
//! +--------+----------+----------------------------------+--------------+
//! ```
//!
//! `Length` is the plaintext payload size: XChaCha20-Poly1305 keeps
//! ciphertext the same length as plaintext, and the detached tag and nonce
//! are accounted for separately. Whether the AEAD overhead is present is
//! decided by the session-encryption flag alone, on both directions.
//!
//! Decoding is transactional: a frame that is not fully buffered yields
//! `None` and consumes nothing.

use bytes::{Buf, BufMut, BytesMut};

use crate::core::{
    AEAD_NONCE_SIZE, AEAD_TAG_SIZE, FRAME_CRYPTO_SIZE, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE,
    WireError,
};

/// One frame as laid out on the wire.
///
/// `body` is plaintext on an unencrypted session and ciphertext (with the
/// detached tag and nonce in `seal`) on an encrypted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Packet type byte.
    pub packet_type: u8,
    /// Detached AEAD tag and nonce, present only on encrypted frames with a
    /// non-empty body.
    pub seal: Option<([u8; AEAD_TAG_SIZE], [u8; AEAD_NONCE_SIZE])>,
    /// Payload bytes, `Length` of them.
    pub body: Vec<u8>,
}

impl RawFrame {
    /// Build a plaintext frame.
    pub fn plain(packet_type: u8, body: Vec<u8>) -> Self {
        Self { packet_type, seal: None, body }
    }

    /// Build an encrypted frame from a detached seal.
    pub fn sealed(
        packet_type: u8,
        tag: [u8; AEAD_TAG_SIZE],
        nonce: [u8; AEAD_NONCE_SIZE],
        ciphertext: Vec<u8>,
    ) -> Self {
        Self { packet_type, seal: Some((tag, nonce)), body: ciphertext }
    }
}

/// Encode a frame into bytes ready for the socket.
pub fn encode(frame: &RawFrame) -> Result<Vec<u8>, WireError> {
    if frame.body.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::Oversize(frame.body.len()));
    }

    let crypto = if frame.seal.is_some() { FRAME_CRYPTO_SIZE } else { 0 };
    let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + crypto + frame.body.len());

    out.put_u8(frame.packet_type);
    out.put_u16(frame.body.len() as u16);

    if let Some((tag, nonce)) = &frame.seal {
        out.put_slice(tag);
        out.put_slice(nonce);
    }
    out.put_slice(&frame.body);

    Ok(out.to_vec())
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `None` when the buffer does not yet hold a complete frame; in
/// that case the buffer is left untouched. `encrypted` is the session
/// encryption flag and decides whether a non-empty frame carries the
/// detached tag and nonce.
pub fn try_decode(buf: &mut BytesMut, encrypted: bool) -> Option<RawFrame> {
    if buf.len() < FRAME_HEADER_SIZE {
        return None;
    }

    let packet_type = buf[0];
    let length = u16::from_be_bytes([buf[1], buf[2]]) as usize;

    let crypto = if encrypted && length > 0 { FRAME_CRYPTO_SIZE } else { 0 };
    let total = FRAME_HEADER_SIZE + crypto + length;

    if buf.len() < total {
        return None;
    }

    buf.advance(FRAME_HEADER_SIZE);

    let seal = if crypto > 0 {
        let mut tag = [0u8; AEAD_TAG_SIZE];
        tag.copy_from_slice(&buf[..AEAD_TAG_SIZE]);
        buf.advance(AEAD_TAG_SIZE);

        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce.copy_from_slice(&buf[..AEAD_NONCE_SIZE]);
        buf.advance(AEAD_NONCE_SIZE);

        Some((tag, nonce))
    } else {
        None
    };

    let body = buf.split_to(length).to_vec();

    Some(RawFrame { packet_type, seal, body })
}
