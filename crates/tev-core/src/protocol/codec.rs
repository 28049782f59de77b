//! Binary codec for the tev IPC packets.
//!
//! Wire format:
//! ```text
//! [total_size:4][type:1][payload:N]
//! ```
//! `total_size` is `4 + 1 + N`. All multi-byte values are little-endian;
//! strings are written as their bytes followed by a single `0x00`.
//!
//! Encoding is infallible. Names must not contain NUL bytes: an embedded NUL
//! ends the string early on the viewer side and corrupts the framing of the
//! rest of the packet. This is not checked here.

use thiserror::Error;

use crate::protocol::packets::{
    CloseImage, CreateImage, OpenImage, Packet, PacketType, ReloadImage, UpdateImage, HEADER_SIZE,
};

/// Errors that can occur while decoding packets.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the packet it claims to hold.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The size prefix is smaller than the fixed header.
    #[error("invalid packet size: {0}")]
    InvalidSize(u32),

    /// The type byte is not a recognized value.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// The payload could not be parsed (missing terminator, bad length, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `packet` into a fresh byte vector.
///
/// # Examples
///
/// ```rust
/// use tev_core::protocol::{encode_packet, CloseImage, Packet};
///
/// let bytes = encode_packet(&Packet::CloseImage(CloseImage {
///     image_name: "a".to_string(),
/// }));
/// assert_eq!(bytes, [7, 0, 0, 0, 2, b'a', 0]);
/// ```
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(packet));
    encode_packet_into(packet, &mut buf);
    buf
}

/// Appends the encoding of `packet` to `buf`.
///
/// Existing contents of `buf` are kept, so several packets can be batched
/// into one buffer.
pub fn encode_packet_into(packet: &Packet, buf: &mut Vec<u8>) {
    match packet {
        Packet::OpenImage(m) => encode_open_image(buf, m),
        Packet::ReloadImage(m) => encode_reload_image(buf, m),
        Packet::CloseImage(m) => encode_close_image(buf, m),
        Packet::UpdateImage(m) => encode_update_image(buf, m),
        Packet::CreateImage(m) => encode_create_image(buf, m),
    }
}

/// Appends the encoding of a bare [`UpdateImage`] to `buf`.
///
/// The row-block scheduler reuses one `UpdateImage` for every block, so this
/// avoids wrapping it in a [`Packet`] for each write.
pub fn encode_update_image(buf: &mut Vec<u8>, m: &UpdateImage) {
    buf.reserve(update_image_len(m));
    framed(buf, PacketType::UpdateImage, |buf| {
        buf.push(m.grab_focus as u8);
        write_cstr(buf, &m.image_name);
        write_cstr(buf, &m.channel_name);
        buf.extend_from_slice(&m.left.to_le_bytes());
        buf.extend_from_slice(&m.top.to_le_bytes());
        buf.extend_from_slice(&m.width.to_le_bytes());
        buf.extend_from_slice(&m.height.to_le_bytes());
        for sample in &m.data {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
    });
}

/// Exact number of bytes [`encode_packet`] will produce for `packet`.
pub fn encoded_len(packet: &Packet) -> usize {
    match packet {
        Packet::OpenImage(m) => HEADER_SIZE + 1 + cstr_len(&m.image_name),
        Packet::ReloadImage(m) => HEADER_SIZE + 1 + cstr_len(&m.image_name),
        Packet::CloseImage(m) => HEADER_SIZE + cstr_len(&m.image_name),
        Packet::UpdateImage(m) => update_image_len(m),
        Packet::CreateImage(m) => {
            HEADER_SIZE
                + 1
                + cstr_len(&m.image_name)
                + 12
                + m.channel_names.iter().map(|n| cstr_len(n)).sum::<usize>()
        }
    }
}

/// Decodes one packet from the beginning of `bytes`.
///
/// Returns the packet and the number of bytes it occupied, so the caller can
/// advance through a stream.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes do not hold a complete, well-formed
/// packet.
pub fn decode_packet(bytes: &[u8]) -> Result<(Packet, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let total = declared as usize;
    if total < HEADER_SIZE {
        return Err(ProtocolError::InvalidSize(declared));
    }
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let tag = bytes[4];
    let packet_type = PacketType::try_from(tag).map_err(|_| ProtocolError::UnknownPacketType(tag))?;

    let mut reader = Reader::new(&bytes[HEADER_SIZE..total]);
    let packet = match packet_type {
        PacketType::OpenImage => Packet::OpenImage(OpenImage {
            grab_focus: reader.read_bool()?,
            image_name: reader.read_cstr()?,
        }),
        PacketType::ReloadImage => Packet::ReloadImage(ReloadImage {
            grab_focus: reader.read_bool()?,
            image_name: reader.read_cstr()?,
        }),
        PacketType::CloseImage => Packet::CloseImage(CloseImage {
            image_name: reader.read_cstr()?,
        }),
        PacketType::UpdateImage => Packet::UpdateImage(decode_update_image(&mut reader)?),
        PacketType::CreateImage => Packet::CreateImage(decode_create_image(&mut reader)?),
    };
    reader.finish(packet_type)?;

    Ok((packet, total))
}

/// Decodes every packet in `bytes`, which must end on a packet boundary.
///
/// # Errors
///
/// Returns the first [`ProtocolError`] encountered.
pub fn decode_stream(mut bytes: &[u8]) -> Result<Vec<Packet>, ProtocolError> {
    let mut packets = Vec::new();
    while !bytes.is_empty() {
        let (packet, consumed) = decode_packet(bytes)?;
        packets.push(packet);
        bytes = &bytes[consumed..];
    }
    Ok(packets)
}

// ── Per-packet encode helpers ─────────────────────────────────────────────────

fn encode_open_image(buf: &mut Vec<u8>, m: &OpenImage) {
    framed(buf, PacketType::OpenImage, |buf| {
        buf.push(m.grab_focus as u8);
        write_cstr(buf, &m.image_name);
    });
}

fn encode_reload_image(buf: &mut Vec<u8>, m: &ReloadImage) {
    framed(buf, PacketType::ReloadImage, |buf| {
        buf.push(m.grab_focus as u8);
        write_cstr(buf, &m.image_name);
    });
}

fn encode_close_image(buf: &mut Vec<u8>, m: &CloseImage) {
    framed(buf, PacketType::CloseImage, |buf| {
        write_cstr(buf, &m.image_name);
    });
}

fn encode_create_image(buf: &mut Vec<u8>, m: &CreateImage) {
    framed(buf, PacketType::CreateImage, |buf| {
        buf.push(m.grab_focus as u8);
        write_cstr(buf, &m.image_name);
        buf.extend_from_slice(&m.width.to_le_bytes());
        buf.extend_from_slice(&m.height.to_le_bytes());
        buf.extend_from_slice(&(m.channel_names.len() as i32).to_le_bytes());
        for name in &m.channel_names {
            write_cstr(buf, name);
        }
    });
}

// ── Per-packet decode helpers ─────────────────────────────────────────────────

fn decode_update_image(r: &mut Reader<'_>) -> Result<UpdateImage, ProtocolError> {
    let grab_focus = r.read_bool()?;
    let image_name = r.read_cstr()?;
    let channel_name = r.read_cstr()?;
    let left = r.read_i32()?;
    let top = r.read_i32()?;
    let width = r.read_i32()?;
    let height = r.read_i32()?;
    if width < 0 || height < 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "UpdateImage: negative extent {width}x{height}"
        )));
    }
    let count = (width as usize) * (height as usize);
    let data = r.read_f32s(count)?;
    Ok(UpdateImage {
        grab_focus,
        image_name,
        channel_name,
        left,
        top,
        width,
        height,
        data,
    })
}

fn decode_create_image(r: &mut Reader<'_>) -> Result<CreateImage, ProtocolError> {
    let grab_focus = r.read_bool()?;
    let image_name = r.read_cstr()?;
    let width = r.read_i32()?;
    let height = r.read_i32()?;
    let num_channels = r.read_i32()?;
    if num_channels < 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "CreateImage: negative channel count {num_channels}"
        )));
    }
    let mut channel_names = Vec::with_capacity((num_channels as usize).min(64));
    for _ in 0..num_channels {
        channel_names.push(r.read_cstr()?);
    }
    Ok(CreateImage {
        grab_focus,
        image_name,
        width,
        height,
        channel_names,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

/// Writes the size placeholder and tag, runs `body`, then patches the size.
fn framed(buf: &mut Vec<u8>, packet_type: PacketType, body: impl FnOnce(&mut Vec<u8>)) {
    let start = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(packet_type as u8);
    body(buf);
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_le_bytes());
}

/// Writes `s` followed by a NUL.
///
/// tev expects ASCII. Non-ASCII names are written as their UTF-8 bytes
/// rather than replaced or rejected; tev shows them as it decodes them.
/// An interior NUL truncates the string on tev's side.
fn write_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn cstr_len(s: &str) -> usize {
    s.len() + 1
}

fn update_image_len(m: &UpdateImage) -> usize {
    HEADER_SIZE + 1 + cstr_len(&m.image_name) + cstr_len(&m.channel_name) + 16 + m.data.len() * 4
}

/// Forward-only cursor over a packet payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(ProtocolError::MalformedPayload(format!(
                "{what}: need {n} bytes at offset {}, {remaining} left",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.take(1, "grab_focus")?[0] != 0)
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_cstr(&mut self) -> Result<String, ProtocolError> {
        let rest = &self.buf[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            ProtocolError::MalformedPayload(format!("unterminated string at offset {}", self.pos))
        })?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
            .to_string();
        self.pos += end + 1;
        Ok(s)
    }

    fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>, ProtocolError> {
        let bytes = self.take(count.saturating_mul(4), "pixel data")?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn finish(&self, packet_type: PacketType) -> Result<(), ProtocolError> {
        let trailing = self.buf.len() - self.pos;
        if trailing != 0 {
            return Err(ProtocolError::MalformedPayload(format!(
                "{packet_type:?}: {trailing} trailing byte(s)"
            )));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
