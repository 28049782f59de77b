//! Protocol module containing packet types and the binary codec.

pub mod codec;
pub mod packets;

pub use codec::{
    decode_packet, decode_stream, encode_packet, encode_packet_into, encode_update_image,
    encoded_len, ProtocolError,
};
pub use packets::*;
