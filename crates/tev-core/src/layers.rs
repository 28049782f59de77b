//! Layers, the pixel-access seam, and channel flattening.
//!
//! tev has no notion of layers on the wire: an image is a flat list of named
//! channels. A layer called `albedo` with three channels becomes the channels
//! `albedo.R`, `albedo.G` and `albedo.B`; a mono layer becomes `albedo.Y`. The
//! order of the flattened list is the order tev assigns channel indices in,
//! so it must be identical for the CreateImage packet and for every later
//! UpdateImage of the same image.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised when a set of layers cannot be mapped onto tev channels.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// An image needs at least one layer.
    #[error("an image needs at least one layer")]
    NoLayers,

    /// Width or height is zero or does not fit the wire's `i32` fields.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Only 1 (mono), 3 (RGB) and 4 (RGBA) channels can be flattened.
    #[error("layer {layer:?} has {channels} channels; only 1, 3 or 4 are supported")]
    UnsupportedChannelLayout { layer: String, channels: usize },

    /// A layer's resolution differs from the image it belongs to.
    #[error(
        "layer {layer:?} is {width}x{height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        layer: String,
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    /// A layer's channel count differs from the one the image was created with.
    #[error("layer {layer:?} has {channels} channels, expected {expected}")]
    ChannelCountMismatch {
        layer: String,
        expected: usize,
        channels: usize,
    },

    /// The number of layers differs from the image it is pushed to.
    #[error("expected {expected} layers, found {found}")]
    LayerCountMismatch { expected: usize, found: usize },
}

// ── Pixel access ──────────────────────────────────────────────────────────────

/// Read-only access to the pixels of one layer.
///
/// This is the only thing the protocol engine needs from an image
/// representation. `channel` is only ever called with in-range coordinates.
#[cfg_attr(test, mockall::automock)]
pub trait PixelSource {
    /// Width in pixels.
    fn width(&self) -> usize;

    /// Height in pixels.
    fn height(&self) -> usize;

    /// Number of interleaved channels per pixel.
    fn num_channels(&self) -> usize;

    /// One sample.
    fn channel(&self, col: usize, row: usize, channel: usize) -> f32;

    /// Fills `out` with consecutive full rows of `channel`, starting at row
    /// `top`, in row-major order. `out.len()` is a multiple of the width.
    ///
    /// The default reads sample by sample; implementations behind a lock
    /// override it to take the lock once per call.
    fn read_rows(&self, channel: usize, top: usize, out: &mut [f32]) {
        let width = self.width();
        if width == 0 {
            return;
        }
        for (i, row) in out.chunks_exact_mut(width).enumerate() {
            for (col, sample) in row.iter_mut().enumerate() {
                *sample = self.channel(col, top + i, channel);
            }
        }
    }
}

// ── Layer ─────────────────────────────────────────────────────────────────────

/// A named group of 1, 3 or 4 channels inside one tev image.
#[derive(Clone)]
pub struct Layer {
    name: String,
    source: Arc<dyn PixelSource + Send + Sync>,
}

impl Layer {
    /// Creates a layer reading its pixels from `source`.
    ///
    /// The empty string is a valid layer name; its channels are `.R`, `.G`, ...
    pub fn new(name: impl Into<String>, source: Arc<dyn PixelSource + Send + Sync>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &(dyn PixelSource + Send + Sync) {
        self.source.as_ref()
    }

    /// The fully qualified channel names of this layer, in wire order.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnsupportedChannelLayout`] for channel counts
    /// other than 1, 3 or 4.
    pub fn channel_names(&self) -> Result<Vec<String>, LayoutError> {
        let channels = self.source.num_channels();
        let suffixes =
            channel_suffixes(channels).ok_or_else(|| LayoutError::UnsupportedChannelLayout {
                layer: self.name.clone(),
                channels,
            })?;
        Ok(suffixes
            .iter()
            .map(|suffix| channel_name(&self.name, suffix))
            .collect())
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("width", &self.source.width())
            .field("height", &self.source.height())
            .field("channels", &self.source.num_channels())
            .finish()
    }
}

/// Channel suffixes for a layer with `num_channels` channels.
///
/// Returns `None` for unsupported counts.
pub fn channel_suffixes(num_channels: usize) -> Option<&'static [&'static str]> {
    match num_channels {
        1 => Some(&["Y"]),
        3 => Some(&["R", "G", "B"]),
        4 => Some(&["R", "G", "B", "A"]),
        _ => None,
    }
}

/// `<layer>.<suffix>`, with no special case for an empty layer name.
pub fn channel_name(layer: &str, suffix: &str) -> String {
    format!("{layer}.{suffix}")
}

// ── Channel layout ────────────────────────────────────────────────────────────

/// The flattened channel list of a multi-layer image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    width: usize,
    height: usize,
    layer_channels: Vec<usize>,
    channel_names: Vec<String>,
}

impl ChannelLayout {
    /// Flattens `layers` into one channel list.
    ///
    /// The image takes the resolution of the first layer; every other layer
    /// must match it.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] for an empty layer list, a zero or oversized
    /// resolution, an unsupported channel count, or mismatched resolutions.
    pub fn from_layers(layers: &[Layer]) -> Result<Self, LayoutError> {
        let first = layers.first().ok_or(LayoutError::NoLayers)?;
        let width = first.source.width();
        let height = first.source.height();
        if !fits_wire(width) || !fits_wire(height) {
            return Err(LayoutError::InvalidDimensions { width, height });
        }

        let mut layer_channels = Vec::with_capacity(layers.len());
        let mut channel_names = Vec::new();
        for layer in layers {
            let (w, h) = (layer.source.width(), layer.source.height());
            if (w, h) != (width, height) {
                return Err(LayoutError::DimensionMismatch {
                    layer: layer.name.clone(),
                    expected_width: width,
                    expected_height: height,
                    width: w,
                    height: h,
                });
            }
            channel_names.extend(layer.channel_names()?);
            layer_channels.push(layer.source.num_channels());
        }

        Ok(Self {
            width,
            height,
            layer_channels,
            channel_names,
        })
    }

    /// Flattens `layers` and checks them against a previously recorded
    /// resolution.
    ///
    /// # Errors
    ///
    /// As [`ChannelLayout::from_layers`], plus
    /// [`LayoutError::DimensionMismatch`] if the layers were resized since.
    pub fn for_registered(
        layers: &[Layer],
        width: usize,
        height: usize,
    ) -> Result<Self, LayoutError> {
        let layout = Self::from_layers(layers)?;
        if (layout.width, layout.height) != (width, height) {
            return Err(LayoutError::DimensionMismatch {
                layer: layers[0].name.clone(),
                expected_width: width,
                expected_height: height,
                width: layout.width,
                height: layout.height,
            });
        }
        Ok(layout)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of channels across all layers.
    pub fn num_channels(&self) -> usize {
        self.channel_names.len()
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Channel count of each layer, in layer order.
    pub fn layer_channels(&self) -> &[usize] {
        &self.layer_channels
    }

    pub fn into_channel_names(self) -> Vec<String> {
        self.channel_names
    }
}

fn fits_wire(extent: usize) -> bool {
    extent > 0 && extent <= i32::MAX as usize
}

// ── Tests ─────────────────────────────────────────────────────────────────────
