//! A minimal interleaved `f32` image implementing [`PixelSource`].
//!
//! Renderers normally bring their own image type and implement
//! [`PixelSource`] for it. `FloatImage` exists for tests, benches and the
//! `tev-push` demo. Wrapping it in a `RwLock` or `Mutex` lets a render loop
//! keep writing pixels while a session reads them between pushes.

use std::sync::{Mutex, RwLock};

use crate::layers::PixelSource;

/// Row-major image with `num_channels` interleaved samples per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    width: usize,
    height: usize,
    num_channels: usize,
    data: Vec<f32>,
}

impl FloatImage {
    /// Creates an image filled with zeros.
    pub fn new(width: usize, height: usize, num_channels: usize) -> Self {
        Self {
            width,
            height,
            num_channels,
            data: vec![0.0; width * height * num_channels],
        }
    }

    /// Creates an image where every sample is `f(col, row, channel)`.
    pub fn from_fn(
        width: usize,
        height: usize,
        num_channels: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(width * height * num_channels);
        for row in 0..height {
            for col in 0..width {
                for ch in 0..num_channels {
                    data.push(f(col, row, ch));
                }
            }
        }
        Self {
            width,
            height,
            num_channels,
            data,
        }
    }

    /// Creates an image where every sample of every channel is `value`.
    pub fn filled(width: usize, height: usize, num_channels: usize, value: f32) -> Self {
        Self {
            width,
            height,
            num_channels,
            data: vec![value; width * height * num_channels],
        }
    }

    /// Returns one sample.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range.
    pub fn get(&self, col: usize, row: usize, channel: usize) -> f32 {
        self.data[self.index(col, row, channel)]
    }

    /// Overwrites one sample.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range.
    pub fn set(&mut self, col: usize, row: usize, channel: usize, value: f32) {
        let i = self.index(col, row, channel);
        self.data[i] = value;
    }

    /// Overwrites all channels of one pixel from `values`.
    pub fn set_pixel(&mut self, col: usize, row: usize, values: &[f32]) {
        let start = self.index(col, row, 0);
        let n = values.len().min(self.num_channels);
        self.data[start..start + n].copy_from_slice(&values[..n]);
    }

    /// Sets every sample to `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// The interleaved sample buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn index(&self, col: usize, row: usize, channel: usize) -> usize {
        assert!(
            col < self.width && row < self.height && channel < self.num_channels,
            "({col}, {row}, {channel}) out of range for {}x{}x{}",
            self.width,
            self.height,
            self.num_channels
        );
        (row * self.width + col) * self.num_channels + channel
    }
}

impl PixelSource for FloatImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn channel(&self, col: usize, row: usize, channel: usize) -> f32 {
        self.get(col, row, channel)
    }

    fn read_rows(&self, channel: usize, top: usize, out: &mut [f32]) {
        let start = top * self.width * self.num_channels;
        let pixels = self.data[start..].chunks_exact(self.num_channels);
        for (sample, pixel) in out.iter_mut().zip(pixels) {
            *sample = pixel[channel];
        }
    }
}

// A poisoned lock still holds readable pixels; a panic in a writer should not
// stop the viewer from showing what was rendered so far.

impl<T: PixelSource + ?Sized> PixelSource for RwLock<T> {
    fn width(&self) -> usize {
        self.read().unwrap_or_else(|e| e.into_inner()).width()
    }

    fn height(&self) -> usize {
        self.read().unwrap_or_else(|e| e.into_inner()).height()
    }

    fn num_channels(&self) -> usize {
        self.read().unwrap_or_else(|e| e.into_inner()).num_channels()
    }

    fn channel(&self, col: usize, row: usize, channel: usize) -> f32 {
        self.read()
            .unwrap_or_else(|e| e.into_inner())
            .channel(col, row, channel)
    }

    fn read_rows(&self, channel: usize, top: usize, out: &mut [f32]) {
        self.read()
            .unwrap_or_else(|e| e.into_inner())
            .read_rows(channel, top, out);
    }
}

impl<T: PixelSource + ?Sized> PixelSource for Mutex<T> {
    fn width(&self) -> usize {
        self.lock().unwrap_or_else(|e| e.into_inner()).width()
    }

    fn height(&self) -> usize {
        self.lock().unwrap_or_else(|e| e.into_inner()).height()
    }

    fn num_channels(&self) -> usize {
        self.lock().unwrap_or_else(|e| e.into_inner()).num_channels()
    }

    fn channel(&self, col: usize, row: usize, channel: usize) -> f32 {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .channel(col, row, channel)
    }

    fn read_rows(&self, channel: usize, top: usize, out: &mut [f32]) {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_rows(channel, top, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_image_is_zeroed() {
        let img = FloatImage::new(3, 2, 3);
        assert_eq!(img.as_slice().len(), 18);
        assert!(img.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_fn_uses_interleaved_row_major_layout() {
        let img = FloatImage::from_fn(2, 2, 2, |c, r, ch| (r * 100 + c * 10 + ch) as f32);
        assert_eq!(
            img.as_slice(),
            [0.0, 1.0, 10.0, 11.0, 100.0, 101.0, 110.0, 111.0]
        );
    }

    #[test]
    fn test_set_and_get_round_trip() {
        let mut img = FloatImage::new(20, 10, 1);
        img.set(10, 9, 0, 10.0);
        assert_eq!(img.get(10, 9, 0), 10.0);
        assert_eq!(img.channel(10, 9, 0), 10.0);
    }

    #[test]
    fn test_set_pixel_writes_all_channels() {
        let mut img = FloatImage::new(4, 4, 3);
        img.set_pixel(1, 2, &[1.0, 0.0, 1.0]);
        assert_eq!(img.get(1, 2, 0), 1.0);
        assert_eq!(img.get(1, 2, 1), 0.0);
        assert_eq!(img.get(1, 2, 2), 1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_out_of_range_panics() {
        FloatImage::new(2, 2, 1).get(2, 0, 0);
    }

    #[test]
    fn test_read_rows_matches_per_sample_reads() {
        // Arrange
        let img = FloatImage::from_fn(5, 4, 3, |c, r, ch| (c + 7 * r) as f32 + ch as f32 * 0.25);
        let mut fast = vec![0.0; 5 * 2];
        let mut slow = vec![0.0; 5 * 2];

        // Act
        img.read_rows(2, 1, &mut fast);
        for (i, sample) in slow.iter_mut().enumerate() {
            *sample = img.channel(i % 5, 1 + i / 5, 2);
        }

        // Assert
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_rwlock_wrapper_reads_current_pixels() {
        let shared = RwLock::new(FloatImage::new(2, 1, 1));
        shared.write().unwrap().set(1, 0, 0, 3.5);

        let mut out = [0.0; 2];
        shared.read_rows(0, 0, &mut out);

        assert_eq!(out, [0.0, 3.5]);
        assert_eq!(PixelSource::width(&shared), 2);
    }

    #[test]
    fn test_mutex_wrapper_forwards_geometry() {
        let shared = Mutex::new(FloatImage::new(7, 3, 4));
        assert_eq!(PixelSource::width(&shared), 7);
        assert_eq!(PixelSource::height(&shared), 3);
        assert_eq!(PixelSource::num_channels(&shared), 4);
    }
}
