//! Wire codec: length-prefixed frames and typed packet payloads.
//!
//! The frame layer ([`frame`]) is byte-oriented and transactional; the
//! packet layer ([`packet`]) maps frame bodies to one tagged sum with an
//! explicit encode/decode arm per packet type.

pub mod frame;
pub mod packet;

pub use frame::{RawFrame, encode as encode_frame, try_decode as try_decode_frame};
pub use packet::{Origin, Packet, PacketType};
