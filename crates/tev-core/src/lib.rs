//! # tev-core
//!
//! Protocol engine for the IPC channel of the [tev] HDR image viewer.
//!
//! tev listens on a TCP port (14158 by default) and accepts a stream of
//! length-prefixed binary packets that create, update, open, reload and close
//! images. This crate contains everything about that conversation that does
//! not touch a socket:
//!
//! - **`protocol`** – The five packet types and their little-endian encoding.
//!   Packets are `u32` total size, `u8` tag, then the payload.
//!
//! - **`layers`** – The [`PixelSource`] seam through which pixels are read,
//!   and the flattening of named 1/3/4-channel layers into tev's flat list of
//!   channel names (`albedo.R`, `albedo.G`, ...).
//!
//! - **`chunking`** – Splitting pixel content into row blocks so no single
//!   UpdateImage packet exceeds a float budget.
//!
//! - **`path`** – Rewriting image identifiers the way tev does, so a client
//!   can address the images it created.
//!
//! - **`image`** – A small interleaved float image for tests and demos.
//!
//! The connection itself lives in the `tev-client` crate.
//!
//! [tev]: https://github.com/Tom94/tev

pub mod chunking;
pub mod image;
pub mod layers;
pub mod path;
pub mod protocol;

pub use chunking::{
    for_each_update, row_stride, RowBlock, RowBlocks, ScheduleError, DEFAULT_BUDGET_FLOATS,
};
pub use image::FloatImage;
pub use layers::{ChannelLayout, Layer, LayoutError, PixelSource};
pub use path::normalize;
pub use protocol::codec::{decode_packet, decode_stream, encode_packet, ProtocolError};
pub use protocol::packets::{Packet, PacketType, DEFAULT_HOST, DEFAULT_PORT};
