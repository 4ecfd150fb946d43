use image::{GrayImage, RgbaImage};
use std::time::Duration;

use crate::core::error::ConsolidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4 bytes per pixel
    Rgba,
    /// 1 byte per pixel, e.g. the Y plane of a YUV frame
    Luma,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Luma => 1,
        }
    }
}

/// One decoded raster frame with its position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub format: PixelFormat,
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            format: PixelFormat::Rgba,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// Grayscale frame; skips the color conversion entirely.
    pub fn from_luma(
        width: u32,
        height: u32,
        y_plane: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data: y_plane,
            format: PixelFormat::Luma,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }

    /// Single-channel intensity image for motion estimation.
    pub fn to_luma(&self) -> Result<GrayImage, ConsolidationError> {
        let expected = self.pixel_count() * self.format.channels();
        if self.data.len() != expected {
            return Err(ConsolidationError::Image(format!(
                "frame {} is {}x{} {:?} but carries {} bytes (expected {})",
                self.frame_number,
                self.width,
                self.height,
                self.format,
                self.data.len(),
                expected
            )));
        }

        match self.format {
            PixelFormat::Luma => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .ok_or_else(|| ConsolidationError::Image("invalid luma buffer".to_string())),
            PixelFormat::Rgba => {
                let rgba = RgbaImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| ConsolidationError::Image("invalid RGBA buffer".to_string()))?;
                Ok(image::imageops::grayscale(&rgba))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let data = vec![255u8; 100 * 100 * 4];
        let frame = Frame::new(100, 100, data, 1500, 30);

        assert_eq!(frame.width, 100);
        assert_eq!(frame.height, 100);
        assert_eq!(frame.pixel_count(), 10000);
        assert_eq!(frame.timestamp.as_millis(), 1500);
        assert_eq!(frame.timestamp_secs(), 1.5);
        assert_eq!(frame.frame_number, 30);
    }

    #[test]
    fn test_rgba_to_luma() {
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[255, 255, 255, 255]);
        }
        let frame = Frame::new(2, 2, data, 0, 0);
        let gray = frame.to_luma().unwrap();
        assert_eq!(gray.dimensions(), (2, 2));
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_luma_passthrough() {
        let frame = Frame::from_luma(3, 1, vec![10, 20, 30], 0, 0);
        let gray = frame.to_luma().unwrap();
        assert_eq!(gray.into_raw(), vec![10, 20, 30]);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let frame = Frame::new(10, 10, vec![0u8; 12], 0, 7);
        assert!(matches!(frame.to_luma(), Err(ConsolidationError::Image(_))));
    }
}
