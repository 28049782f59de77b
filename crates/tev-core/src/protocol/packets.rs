//! All packet types understood by the tev IPC endpoint.
//!
//! Every packet on the wire is `[total_size:u32][type:u8][payload]`, where
//! `total_size` counts itself. Integers are little-endian, strings are
//! NUL-terminated, pixel samples are `f32`.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the common packet prefix in bytes: `u32` total size + `u8` tag.
pub const HEADER_SIZE: usize = 5;

/// TCP port tev listens on unless started with `--hostname`.
pub const DEFAULT_PORT: u16 = 14158;

/// Host used when no other endpoint is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

// ── Packet type tags ──────────────────────────────────────────────────────────

/// Type tag written right after the size prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    OpenImage = 0,
    ReloadImage = 1,
    CloseImage = 2,
    UpdateImage = 3,
    CreateImage = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(PacketType::OpenImage),
            1 => Ok(PacketType::ReloadImage),
            2 => Ok(PacketType::CloseImage),
            3 => Ok(PacketType::UpdateImage),
            4 => Ok(PacketType::CreateImage),
            _ => Err(()),
        }
    }
}

// ── Per-packet payload structs ────────────────────────────────────────────────

/// OPEN_IMAGE (0): asks tev to load a file from its own file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenImage {
    /// Bring the tev window to the front and select the image.
    pub grab_focus: bool,
    /// Path of the file on the machine running tev.
    pub image_name: String,
}

/// RELOAD_IMAGE (1): asks tev to re-read a previously opened file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadImage {
    pub grab_focus: bool,
    /// Must match the path used when the image was opened.
    pub image_name: String,
}

/// CLOSE_IMAGE (2): removes an image from tev, whatever created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseImage {
    pub image_name: String,
}

/// UPDATE_IMAGE (3): overwrites a rectangle of one channel.
///
/// `data` holds `width * height` samples in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateImage {
    pub grab_focus: bool,
    pub image_name: String,
    /// Full channel name, e.g. `"albedo.R"`.
    pub channel_name: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub data: Vec<f32>,
}

/// CREATE_IMAGE (4): allocates an empty image with the given channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateImage {
    pub grab_focus: bool,
    pub image_name: String,
    pub width: i32,
    pub height: i32,
    /// Channel names in the order later updates will address them.
    /// The wire `numChannels` field is the length of this list.
    pub channel_names: Vec<String>,
}

// ── Top-level packet enum ─────────────────────────────────────────────────────

/// A single packet that can be written to a tev connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    OpenImage(OpenImage),
    ReloadImage(ReloadImage),
    CloseImage(CloseImage),
    UpdateImage(UpdateImage),
    CreateImage(CreateImage),
}

impl Packet {
    /// Returns the wire tag for this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::OpenImage(_) => PacketType::OpenImage,
            Packet::ReloadImage(_) => PacketType::ReloadImage,
            Packet::CloseImage(_) => PacketType::CloseImage,
            Packet::UpdateImage(_) => PacketType::UpdateImage,
            Packet::CreateImage(_) => PacketType::CreateImage,
        }
    }

    /// The image identifier every packet kind carries.
    pub fn image_name(&self) -> &str {
        match self {
            Packet::OpenImage(p) => &p.image_name,
            Packet::ReloadImage(p) => &p.image_name,
            Packet::CloseImage(p) => &p.image_name,
            Packet::UpdateImage(p) => &p.image_name,
            Packet::CreateImage(p) => &p.image_name,
        }
    }

    /// Mutable access to the image identifier, used to normalize it in place.
    pub fn image_name_mut(&mut self) -> &mut String {
        match self {
            Packet::OpenImage(p) => &mut p.image_name,
            Packet::ReloadImage(p) => &mut p.image_name,
            Packet::CloseImage(p) => &mut p.image_name,
            Packet::UpdateImage(p) => &mut p.image_name,
            Packet::CreateImage(p) => &mut p.image_name,
        }
    }
}

impl From<OpenImage> for Packet {
    fn from(p: OpenImage) -> Self {
        Packet::OpenImage(p)
    }
}

impl From<ReloadImage> for Packet {
    fn from(p: ReloadImage) -> Self {
        Packet::ReloadImage(p)
    }
}

impl From<CloseImage> for Packet {
    fn from(p: CloseImage) -> Self {
        Packet::CloseImage(p)
    }
}

impl From<UpdateImage> for Packet {
    fn from(p: UpdateImage) -> Self {
        Packet::UpdateImage(p)
    }
}

impl From<CreateImage> for Packet {
    fn from(p: CreateImage) -> Self {
        Packet::CreateImage(p)
    }
}
