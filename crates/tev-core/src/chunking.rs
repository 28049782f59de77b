//! Row-block scheduling for UpdateImage packets.
//!
//! A full image can be far larger than what tev buffers for a single packet,
//! so pixel content is sent as horizontal strips. The strip height is chosen
//! so that one strip of one channel holds at most `budget_floats` samples:
//!
//! ```text
//! stride = clamp(budget_floats / width, 1, height)
//! ```
//!
//! Strips go top to bottom. Within a strip, layers go in registration order
//! and channels in `Y` or `R, G, B, A` order, so the packet sequence for a
//! given image and budget is fully deterministic.

use thiserror::Error;
use tracing::trace;

use crate::layers::{channel_name, channel_suffixes, Layer, LayoutError};
use crate::protocol::UpdateImage;

/// Default number of `f32` samples per UpdateImage packet.
///
/// Empirically well below tev's receive buffer; not a protocol limit.
pub const DEFAULT_BUDGET_FLOATS: usize = 200_000;

/// Height of each row block for an image of `width` x `height`.
///
/// Always at least 1 and never more than `height` (unless `height` is 0).
pub fn row_stride(width: usize, height: usize, budget_floats: usize) -> usize {
    let stride = if width == 0 {
        height
    } else {
        budget_floats / width
    };
    stride.clamp(1, height.max(1))
}

/// One horizontal strip of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBlock {
    /// First row of the strip.
    pub top: usize,
    /// Number of rows, `min(stride, height - top)`.
    pub height: usize,
}

/// Iterator over the row blocks covering `0..height`.
#[derive(Debug, Clone)]
pub struct RowBlocks {
    height: usize,
    stride: usize,
    next_top: usize,
}

impl RowBlocks {
    /// Blocks for an image of `width` x `height` under `budget_floats`.
    pub fn new(width: usize, height: usize, budget_floats: usize) -> Self {
        Self::with_stride(height, row_stride(width, height, budget_floats))
    }

    /// Blocks of a fixed `stride` (clamped to at least 1).
    pub fn with_stride(height: usize, stride: usize) -> Self {
        Self {
            height,
            stride: stride.max(1),
            next_top: 0,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Iterator for RowBlocks {
    type Item = RowBlock;

    fn next(&mut self) -> Option<RowBlock> {
        if self.next_top >= self.height {
            return None;
        }
        let top = self.next_top;
        let height = self.stride.min(self.height - top);
        self.next_top += height;
        Some(RowBlock { top, height })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.height.saturating_sub(self.next_top);
        let n = remaining.div_ceil(self.stride);
        (n, Some(n))
    }
}

impl ExactSizeIterator for RowBlocks {}

/// Drives UpdateImage emission for all pixels of `layers`.
///
/// `width`, `height` and `layer_channels` describe the image as it was
/// created in tev, with `layer_channels[i]` the channel count of
/// `layers[i]`. Layers that no longer match are rejected: tev only accepts
/// updates for the channels it was told about.
///
/// `emit` is called once per (row block, layer, channel). The same
/// [`UpdateImage`] value is reused between calls, with its rectangle, channel
/// name and samples overwritten each time; callers encode or copy it before
/// returning. The first error returned by `emit` stops the schedule.
///
/// `image_name` is written into the packets as given; normalize it before.
///
/// # Errors
///
/// Returns [`ScheduleError::Layout`] before the first `emit` call if the
/// layers differ from `width` x `height` or from `layer_channels`, and
/// [`ScheduleError::Emit`] with whatever `emit` returned.
pub fn for_each_update<E>(
    image_name: &str,
    layers: &[Layer],
    width: usize,
    height: usize,
    layer_channels: &[usize],
    budget_floats: usize,
    mut emit: impl FnMut(&UpdateImage) -> Result<(), E>,
) -> Result<(), ScheduleError<E>> {
    if layers.len() != layer_channels.len() {
        return Err(ScheduleError::Layout(LayoutError::LayerCountMismatch {
            expected: layer_channels.len(),
            found: layers.len(),
        }));
    }

    let mut plan = Vec::with_capacity(layers.len());
    for (layer, &expected) in layers.iter().zip(layer_channels) {
        let source = layer.source();
        let (w, h) = (source.width(), source.height());
        if (w, h) != (width, height) {
            return Err(ScheduleError::Layout(LayoutError::DimensionMismatch {
                layer: layer.name().to_string(),
                expected_width: width,
                expected_height: height,
                width: w,
                height: h,
            }));
        }
        let channels = source.num_channels();
        let suffixes =
            channel_suffixes(channels).ok_or_else(|| LayoutError::UnsupportedChannelLayout {
                layer: layer.name().to_string(),
                channels,
            })?;
        if channels != expected {
            return Err(ScheduleError::Layout(LayoutError::ChannelCountMismatch {
                layer: layer.name().to_string(),
                expected,
                channels,
            }));
        }
        let names: Vec<String> = suffixes
            .iter()
            .map(|suffix| channel_name(layer.name(), suffix))
            .collect();
        plan.push((layer, names));
    }

    let blocks = RowBlocks::new(width, height, budget_floats);
    let mut update = UpdateImage {
        grab_focus: false,
        image_name: image_name.to_string(),
        channel_name: String::new(),
        left: 0,
        top: 0,
        width: width as i32,
        height: 0,
        data: Vec::with_capacity(width * blocks.stride()),
    };

    for block in blocks {
        trace!(top = block.top, rows = block.height, "row block");
        update.top = block.top as i32;
        update.height = block.height as i32;
        update.data.resize(width * block.height, 0.0);

        for (layer, names) in &plan {
            for (channel, name) in names.iter().enumerate() {
                update.channel_name.clear();
                update.channel_name.push_str(name);
                layer.source().read_rows(channel, block.top, &mut update.data);
                emit(&update).map_err(ScheduleError::Emit)?;
            }
        }
    }

    Ok(())
}

/// Failure of [`for_each_update`].
#[derive(Debug, PartialEq, Error)]
pub enum ScheduleError<E> {
    /// The layers no longer fit the registered image.
    #[error("layers do not match the created image: {0}")]
    Layout(LayoutError),
    /// The emit callback failed.
    #[error("update emission failed: {0}")]
    Emit(E),
}

impl<E> From<LayoutError> for ScheduleError<E> {
    fn from(e: LayoutError) -> Self {
        ScheduleError::Layout(e)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::image::FloatImage;
    use crate::layers::MockPixelSource;

    fn collect(
        layers: &[Layer],
        width: usize,
        height: usize,
        budget: usize,
    ) -> Vec<UpdateImage> {
        let mut out = Vec::new();
        let channels: Vec<usize> = layers.iter().map(|l| l.source().num_channels()).collect();
        for_each_update::<()>("img", layers, width, height, &channels, budget, |u| {
            out.push(u.clone());
            Ok(())
        })
        .expect("schedule");
        out
    }

    // ── Stride and blocks ────────────────────────────────────────────────────

    #[test]
    fn test_row_stride_divides_budget_by_width() {
        assert_eq!(row_stride(1000, 1000, 200_000), 200);
    }

    #[test]
    fn test_row_stride_is_clamped_to_height() {
        assert_eq!(row_stride(20, 10, 200_000), 10);
    }

    #[test]
    fn test_row_stride_is_at_least_one_for_very_wide_images() {
        assert_eq!(row_stride(500_000, 3, 200_000), 1);
        assert_eq!(row_stride(10, 3, 0), 1);
    }

    #[test]
    fn test_block_count_is_ceil_of_height_over_stride_and_heights_sum_to_height() {
        for height in [1usize, 2, 7, 10, 99, 100, 101] {
            for stride in [1usize, 3, 10, 100, 1000] {
                // Arrange / Act
                let blocks: Vec<RowBlock> = RowBlocks::with_stride(height, stride).collect();

                // Assert
                assert_eq!(blocks.len(), height.div_ceil(stride), "H={height} s={stride}");
                assert_eq!(blocks.iter().map(|b| b.height).sum::<usize>(), height);
            }
        }
    }

    #[test]
    fn test_blocks_are_contiguous_and_top_to_bottom() {
        let blocks: Vec<RowBlock> = RowBlocks::with_stride(10, 4).collect();
        assert_eq!(
            blocks,
            [
                RowBlock { top: 0, height: 4 },
                RowBlock { top: 4, height: 4 },
                RowBlock { top: 8, height: 2 },
            ]
        );
    }

    #[test]
    fn test_row_blocks_reports_exact_length() {
        let mut blocks = RowBlocks::with_stride(10, 4);
        assert_eq!(blocks.len(), 3);
        blocks.next();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_zero_height_yields_no_blocks() {
        assert_eq!(RowBlocks::new(10, 0, 100).count(), 0);
    }

    // ── Update emission ──────────────────────────────────────────────────────

    #[test]
    fn test_small_mono_image_is_a_single_update() {
        // Arrange
        let layers = vec![Layer::new("", Arc::new(FloatImage::filled(20, 10, 1, 0.75)))];

        // Act
        let updates = collect(&layers, 20, 10, DEFAULT_BUDGET_FLOATS);

        // Assert
        assert_eq!(updates.len(), 1);
        let u = &updates[0];
        assert_eq!((u.left, u.top, u.width, u.height), (0, 0, 20, 10));
        assert_eq!(u.channel_name, ".Y");
        assert_eq!(u.data, vec![0.75; 200]);
    }

    #[test]
    fn test_channels_follow_layer_then_rgb_order_within_each_block() {
        // Arrange – stride 2 over 3 rows gives two blocks
        let layers = vec![
            Layer::new("c", Arc::new(FloatImage::new(4, 3, 3))),
            Layer::new("m", Arc::new(FloatImage::new(4, 3, 1))),
        ];

        // Act
        let updates = collect(&layers, 4, 3, 8);

        // Assert
        let order: Vec<(i32, &str)> = updates
            .iter()
            .map(|u| (u.top, u.channel_name.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                (0, "c.R"),
                (0, "c.G"),
                (0, "c.B"),
                (0, "m.Y"),
                (2, "c.R"),
                (2, "c.G"),
                (2, "c.B"),
                (2, "m.Y"),
            ]
        );
    }

    #[test]
    fn test_samples_are_row_major_for_each_block() {
        // Arrange – value encodes position and channel
        let img = FloatImage::from_fn(3, 5, 3, |c, r, ch| (r * 10 + c) as f32 + ch as f32 * 0.5);
        let layers = vec![Layer::new("x", Arc::new(img))];

        // Act – budget of 6 samples means 2 rows per block
        let updates = collect(&layers, 3, 5, 6);

        // Assert
        for u in &updates {
            let ch = ["x.R", "x.G", "x.B"]
                .iter()
                .position(|n| *n == u.channel_name)
                .unwrap();
            for row in 0..u.height as usize {
                for col in 0..3 {
                    let expected = ((u.top as usize + row) * 10 + col) as f32 + ch as f32 * 0.5;
                    assert_eq!(u.data[row * 3 + col], expected);
                }
            }
        }
    }

    #[test]
    fn test_rectangles_tile_each_channel_exactly_once() {
        // Arrange
        let (w, h) = (7usize, 23usize);
        let layers = vec![Layer::new("rgb", Arc::new(FloatImage::new(w, h, 3)))];

        // Act
        let updates = collect(&layers, w, h, 30);

        // Assert
        for name in ["rgb.R", "rgb.G", "rgb.B"] {
            let mut covered = vec![0u8; w * h];
            for u in updates.iter().filter(|u| u.channel_name == name) {
                assert_eq!(u.left, 0);
                assert_eq!(u.width as usize, w);
                assert_eq!(u.data.len(), w * u.height as usize);
                for row in u.top as usize..(u.top + u.height) as usize {
                    for col in 0..w {
                        covered[row * w + col] += 1;
                    }
                }
            }
            assert!(covered.iter().all(|&c| c == 1), "{name} not tiled exactly once");
        }
    }

    #[test]
    fn test_short_last_block_sends_only_its_rows() {
        let layers = vec![Layer::new("", Arc::new(FloatImage::new(10, 5, 1)))];

        let updates = collect(&layers, 10, 5, 20);

        let heights: Vec<i32> = updates.iter().map(|u| u.height).collect();
        assert_eq!(heights, [2, 2, 1]);
        assert_eq!(updates[2].data.len(), 10);
    }

    #[test]
    fn test_dimension_mismatch_is_reported_before_any_read() {
        // Arrange – a source that must never be sampled
        let mut mock = MockPixelSource::new();
        mock.expect_width().return_const(8usize);
        mock.expect_height().return_const(4usize);
        mock.expect_num_channels().return_const(3usize);
        mock.expect_read_rows().never();
        mock.expect_channel().never();
        let layers = vec![Layer::new("a", Arc::new(mock))];
        let mut emitted = 0;

        // Act
        let result = for_each_update::<()>("img", &layers, 8, 8, &[3], 100, |_| {
            emitted += 1;
            Ok(())
        });

        // Assert
        assert!(matches!(
            result,
            Err(ScheduleError::Layout(LayoutError::DimensionMismatch { .. }))
        ));
        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_channel_count_change_is_reported_before_any_read() {
        // Arrange – created as RGB, now RGBA
        let mut mock = MockPixelSource::new();
        mock.expect_width().return_const(4usize);
        mock.expect_height().return_const(4usize);
        mock.expect_num_channels().return_const(4usize);
        mock.expect_read_rows().never();
        mock.expect_channel().never();
        let layers = vec![Layer::new("c", Arc::new(mock))];
        let mut emitted = 0;

        // Act
        let result = for_each_update::<()>("img", &layers, 4, 4, &[3], 100, |_| {
            emitted += 1;
            Ok(())
        });

        // Assert
        assert_eq!(
            result,
            Err(ScheduleError::Layout(LayoutError::ChannelCountMismatch {
                layer: "c".to_string(),
                expected: 3,
                channels: 4,
            }))
        );
        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_layer_count_must_match_channel_list() {
        let layers = vec![Layer::new("", Arc::new(FloatImage::new(2, 2, 1)))];

        let result = for_each_update::<()>("img", &layers, 2, 2, &[1, 1], 100, |_| Ok(()));

        assert_eq!(
            result,
            Err(ScheduleError::Layout(LayoutError::LayerCountMismatch {
                expected: 2,
                found: 1,
            }))
        );
    }

    #[test]
    fn test_schedule_error_displays_inner_error() {
        let err: ScheduleError<&str> = ScheduleError::Emit("broken pipe");
        assert_eq!(err.to_string(), "update emission failed: broken pipe");
    }

    #[test]
    fn test_emit_error_stops_the_schedule() {
        let layers = vec![Layer::new("", Arc::new(FloatImage::new(4, 4, 3)))];
        let mut calls = 0;

        let result = for_each_update("img", &layers, 4, 4, &[3], 100, |_| {
            calls += 1;
            if calls == 2 {
                Err("broken pipe")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err(ScheduleError::Emit("broken pipe")));
        assert_eq!(calls, 2);
    }
}
