//! One live conversation with a tev instance.
//!
//! A [`Session`] owns the TCP stream and the registry of images it created.
//! Every operation is a blocking sequence of writes on that one stream, so tev
//! sees packets in exactly the order the calls were made. tev never answers;
//! the only failures are local usage errors and socket write errors.
//!
//! # Lifecycle
//!
//! ```text
//!  connect() ──ok──► Connected ──disconnect() / write error──► Disposed
//!     │
//!     └──err──► ConnectionFailed (no session)
//! ```
//!
//! All operations take `&mut self`. A render loop and a UI thread that both
//! push must share the session behind a `Mutex`.

pub mod registry;

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tev_core::chunking::{for_each_update, ScheduleError, DEFAULT_BUDGET_FLOATS};
use tev_core::protocol::codec::{encode_packet_into, encode_update_image};
use tev_core::protocol::packets::{
    CloseImage, CreateImage, OpenImage, Packet, ReloadImage, DEFAULT_HOST, DEFAULT_PORT,
};
use tev_core::{normalize, ChannelLayout, Layer, LayoutError, PixelSource};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

pub use registry::{ImageRegistry, RegisteredImage};

/// Errors returned by [`Session`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The TCP connection to tev could not be established.
    #[error("failed to connect to tev at {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The session was disconnected or lost its stream.
    #[error("session is closed")]
    SessionClosed,

    /// The name is already registered; close it first.
    #[error("image {0:?} is already registered")]
    DuplicateRegistration(String),

    /// `push` was called for a name that is not registered.
    #[error("image {0:?} is not registered")]
    UnknownImage(String),

    /// Writing to the stream failed. The session is disposed.
    #[error("write to tev failed: {0}")]
    TransportWriteFailed(#[source] io::Error),

    /// The layers cannot be expressed as tev channels, or were resized.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// The byte sink a session writes packets to.
///
/// Implemented for [`TcpStream`]; tests and offline capture use in-memory
/// writers.
pub trait Transport: Write {
    /// Closes the underlying stream. The default does nothing.
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl Transport for Vec<u8> {}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Per-session behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Sent with CreateImage, OpenImage and ReloadImage.
    pub grab_focus: bool,
    /// Maximum `f32` samples per UpdateImage packet.
    pub budget_floats: usize,
    /// Bound on the TCP connect; `None` blocks for the OS default.
    pub connect_timeout: Option<Duration>,
    /// Bound on each socket write; `None` blocks until tev reads.
    pub write_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grab_focus: false,
            budget_floats: DEFAULT_BUDGET_FLOATS,
            connect_timeout: None,
            write_timeout: None,
        }
    }
}

/// Whether a session can still be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disposed,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A blocking protocol session with one tev instance.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use tev_client::Session;
/// use tev_core::{FloatImage, Layer};
///
/// let mut session = Session::connect("127.0.0.1", 14158)?;
/// let image = Arc::new(FloatImage::filled(64, 64, 3, 0.5));
/// session.register("preview", vec![Layer::new("color", image)])?;
/// session.push("preview")?;
/// session.disconnect()?;
/// # Ok::<(), tev_client::SessionError>(())
/// ```
#[derive(Debug)]
pub struct Session<T: Transport = TcpStream> {
    transport: Option<T>,
    registry: ImageRegistry,
    config: SessionConfig,
    scratch: Vec<u8>,
}

impl Session<TcpStream> {
    /// Connects to tev at `host:port` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionFailed`] if the host cannot be
    /// resolved or nothing accepts the connection.
    pub fn connect(host: &str, port: u16) -> Result<Self, SessionError> {
        Self::connect_with(host, port, SessionConfig::default())
    }

    /// Connects to tev at `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConnectionFailed`] if the connection cannot be
    /// established or the socket options cannot be applied.
    pub fn connect_with(
        host: &str,
        port: u16,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let addr = format!("{host}:{port}");
        let fail = |source: io::Error| SessionError::ConnectionFailed {
            addr: addr.clone(),
            source,
        };

        let stream = match config.connect_timeout {
            Some(timeout) => connect_timeout(host, port, timeout),
            None => TcpStream::connect((host, port)),
        }
        .map_err(&fail)?;
        stream.set_write_timeout(config.write_timeout).map_err(&fail)?;
        stream.set_nodelay(true).map_err(&fail)?;

        info!(%addr, "connected to tev");
        Ok(Self::with_transport(stream, config))
    }
}

impl<T: Transport> Session<T> {
    /// Wraps an already open transport.
    pub fn with_transport(transport: T, config: SessionConfig) -> Self {
        Self {
            transport: Some(transport),
            registry: ImageRegistry::new(),
            config,
            scratch: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.transport.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disposed
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The transport, or `None` once disposed.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Whether `name` (after normalization) is currently registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains(&normalize(name))
    }

    /// Normalized names of all registered images, sorted.
    pub fn registered_images(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    /// Creates an image in tev with the channels of `layers`.
    ///
    /// The image takes the resolution of the first layer. Pixels are not sent
    /// until [`Session::push`].
    ///
    /// # Errors
    ///
    /// - [`SessionError::DuplicateRegistration`] if `name` is registered.
    /// - [`SessionError::Layout`] for an empty layer list, an unsupported
    ///   channel count or layers of different resolution.
    /// - [`SessionError::TransportWriteFailed`] if the CreateImage write fails.
    ///
    /// Nothing is written and the registry is unchanged on the first two.
    pub fn register(&mut self, name: &str, layers: Vec<Layer>) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let key = normalize(name);
        if self.registry.contains(&key) {
            return Err(SessionError::DuplicateRegistration(key));
        }

        let layout = ChannelLayout::from_layers(&layers)?;
        let (width, height) = (layout.width(), layout.height());
        let channels = layout.num_channels();
        let layer_channels = layout.layer_channels().to_vec();
        let packet = Packet::CreateImage(CreateImage {
            grab_focus: self.config.grab_focus,
            image_name: key.clone(),
            width: width as i32,
            height: height as i32,
            channel_names: layout.into_channel_names(),
        });
        self.write(&packet)?;

        debug!(image = %key, width, height, channels, "registered image");
        self.registry.insert(
            key,
            RegisteredImage {
                width,
                height,
                channels: layer_channels,
                layers,
            },
        );
        Ok(())
    }

    /// Sends the current pixels of every layer of `name`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownImage`] if `name` is not registered.
    /// - [`SessionError::Layout`] if a layer no longer has the registered
    ///   resolution or channel count; detected before any packet is written.
    /// - [`SessionError::TransportWriteFailed`] if a write fails part way.
    pub fn push(&mut self, name: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let key = normalize(name);
        let Self {
            transport,
            registry,
            config,
            scratch,
        } = self;
        let image = registry
            .get(&key)
            .ok_or_else(|| SessionError::UnknownImage(key.clone()))?;

        let mut packets = 0usize;
        let result = for_each_update(
            &key,
            &image.layers,
            image.width,
            image.height,
            &image.channels,
            config.budget_floats,
            |update| {
                scratch.clear();
                encode_update_image(scratch, update);
                packets += 1;
                write_packet(transport, scratch.as_slice())
            },
        );

        match result {
            Ok(()) => {
                debug!(image = %key, packets, "pushed image");
                Ok(())
            }
            Err(ScheduleError::Layout(e)) => Err(e.into()),
            Err(ScheduleError::Emit(e)) => Err(e),
        }
    }

    /// Forgets `name` and tells tev to close it.
    ///
    /// The CloseImage packet is sent even if `name` was never registered
    /// here, since tev may hold images from other sources.
    pub fn close(&mut self, name: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let key = normalize(name);
        let was_registered = self.registry.remove(&key).is_some();
        debug!(image = %key, was_registered, "closing image");
        self.write(&Packet::CloseImage(CloseImage { image_name: key }))
    }

    /// Asks tev to load `path` from its own file system.
    pub fn open(&mut self, path: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let packet = Packet::OpenImage(OpenImage {
            grab_focus: self.config.grab_focus,
            image_name: normalize(path),
        });
        self.write(&packet)
    }

    /// Asks tev to re-read a file it opened earlier.
    pub fn reload(&mut self, path: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let packet = Packet::ReloadImage(ReloadImage {
            grab_focus: self.config.grab_focus,
            image_name: normalize(path),
        });
        self.write(&packet)
    }

    /// Replaces whatever tev shows under `name` with `layers`.
    ///
    /// Close, register and push in one call.
    pub fn display(&mut self, name: &str, layers: Vec<Layer>) -> Result<(), SessionError> {
        self.close(name)?;
        self.register(name, layers)?;
        self.push(name)
    }

    /// Writes an arbitrary packet after normalizing its image name.
    ///
    /// The registry is not consulted or updated.
    pub fn send(&mut self, packet: impl Into<Packet>) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let mut packet = packet.into();
        let name = packet.image_name_mut();
        *name = normalize(name);
        self.write(&packet)
    }

    /// Closes the stream and drops the registry.
    ///
    /// The session is disposed whether or not closing succeeds. A peer that
    /// already hung up (`NotConnected` from shutdown) is not an error.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionClosed`] if already disposed.
    /// - [`SessionError::TransportWriteFailed`] if flushing or shutting down
    ///   the stream fails.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        let mut transport = self.transport.take().ok_or(SessionError::SessionClosed)?;
        let images = self.registry.len();
        self.registry.clear();

        let closed = transport.flush().and_then(|_| match transport.shutdown() {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        });
        if let Err(e) = closed {
            warn!(error = %e, images, "error while closing connection to tev");
            return Err(SessionError::TransportWriteFailed(e));
        }
        info!(images, "disconnected from tev");
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.transport.is_some() {
            Ok(())
        } else {
            Err(SessionError::SessionClosed)
        }
    }

    fn write(&mut self, packet: &Packet) -> Result<(), SessionError> {
        self.scratch.clear();
        encode_packet_into(packet, &mut self.scratch);
        trace!(
            packet_type = ?packet.packet_type(),
            image = packet.image_name(),
            "writing packet"
        );
        write_packet(&mut self.transport, &self.scratch)
    }
}

/// Writes one encoded packet, dropping the transport if the write fails.
fn write_packet<T: Transport>(transport: &mut Option<T>, bytes: &[u8]) -> Result<(), SessionError> {
    let stream = transport.as_mut().ok_or(SessionError::SessionClosed)?;
    if let Err(e) = stream.write_all(bytes).and_then(|_| stream.flush()) {
        error!(error = %e, bytes = bytes.len(), "write to tev failed, disposing session");
        *transport = None;
        return Err(SessionError::TransportWriteFailed(e));
    }
    trace!(bytes = bytes.len(), "packet written");
    Ok(())
}

fn connect_timeout(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "host resolved to no addresses")
    }))
}

// ── One-shot helpers ──────────────────────────────────────────────────────────

/// Shows a single-layer image in a tev running on the local default port.
///
/// Connects, replaces any image called `name`, and disconnects. The layer
/// name is empty, so the channels are `.Y` or `.R`, `.G`, `.B` (, `.A`).
pub fn show_image(
    name: &str,
    image: Arc<dyn PixelSource + Send + Sync>,
) -> Result<(), SessionError> {
    show_image_at(DEFAULT_HOST, DEFAULT_PORT, name, image)
}

/// [`show_image`] against an explicit endpoint.
pub fn show_image_at(
    host: &str,
    port: u16,
    name: &str,
    image: Arc<dyn PixelSource + Send + Sync>,
) -> Result<(), SessionError> {
    let mut session = Session::connect(host, port)?;
    session.display(name, vec![Layer::new("", image)])?;
    session.disconnect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
