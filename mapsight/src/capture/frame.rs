//! Captured frame type.

use std::fmt;
use std::time::Instant;

use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};

use super::CaptureError;

/// Channel layout of a frame's pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One 8-bit luminance channel.
    Gray8,
    /// Red, green, blue.
    Rgb8,
    /// Red, green, blue, alpha.
    Rgba8,
    /// Blue, green, red, alpha (typical desktop capture surface order).
    Bgra8,
}

impl PixelLayout {
    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb8 => 3,
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelLayout::Gray8 => "gray8",
            PixelLayout::Rgb8 => "rgb8",
            PixelLayout::Rgba8 => "rgba8",
            PixelLayout::Bgra8 => "bgra8",
        };
        f.write_str(name)
    }
}

/// A single captured screen image.
///
/// Frames are created by a [`CaptureSource`](super::CaptureSource), stamped
/// with a sequence number by the capture service and shared with consumers
/// as `Arc<Frame>` through the latest-frame slot.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: Vec<u8>,
    timestamp: Instant,
    sequence: u64,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Wrap a raw pixel buffer captured now.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::InvalidFrame` if the buffer length does not
    /// match `width × height × channels` or either dimension is zero.
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} {} frame needs {} bytes, got {}",
                width,
                height,
                layout,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
            timestamp: Instant::now(),
            sequence: 0,
        })
    }

    /// Build a frame from a grayscale image.
    pub fn from_gray(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            layout: PixelLayout::Gray8,
            data: image.into_raw(),
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    /// Build a frame from an RGBA image.
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            layout: PixelLayout::Rgba8,
            data: image.into_raw(),
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    /// Return the frame with its sequence number replaced.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Raw pixel bytes in [`layout`](Self::layout) order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Monotonic capture time.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Capture sequence number (0 until published by the capture service).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Convert to a single-channel luminance image.
    ///
    /// Uses the same luma weights as `image`'s own conversions so captured
    /// frames and a reference map loaded from colour files agree.
    pub fn to_gray(&self) -> GrayImage {
        let (w, h) = (self.width, self.height);
        let gray = match self.layout {
            PixelLayout::Gray8 => GrayImage::from_raw(w, h, self.data.clone()),
            PixelLayout::Rgb8 => RgbImage::from_raw(w, h, self.data.clone())
                .map(|img| DynamicImage::ImageRgb8(img).into_luma8()),
            PixelLayout::Rgba8 => RgbaImage::from_raw(w, h, self.data.clone())
                .map(|img| DynamicImage::ImageRgba8(img).into_luma8()),
            PixelLayout::Bgra8 => {
                let mut rgba = self.data.clone();
                for px in rgba.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                RgbaImage::from_raw(w, h, rgba).map(|img| DynamicImage::ImageRgba8(img).into_luma8())
            }
        };
        // Lengths are validated at construction, so from_raw cannot fail.
        gray.unwrap_or_else(|| ImageBuffer::new(w, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_frame_size_validation() {
        let err = Frame::new(4, 4, PixelLayout::Rgb8, vec![0; 10]).unwrap_err();
        assert!(err.to_string().contains("needs 48 bytes, got 10"));

        let err = Frame::new(0, 4, PixelLayout::Gray8, Vec::new()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFrame(_)));

        assert!(Frame::new(4, 4, PixelLayout::Bgra8, vec![0; 64]).is_ok());
    }

    #[test]
    fn test_gray_frame_passthrough() {
        let img = GrayImage::from_fn(8, 6, |x, y| Luma([(x * 10 + y) as u8]));
        let frame = Frame::from_gray(img.clone());
        assert_eq!(frame.layout(), PixelLayout::Gray8);
        assert_eq!(frame.to_gray(), img);
    }

    #[test]
    fn test_bgra_and_rgba_agree() {
        // Pure red in both layouts
        let rgba = Frame::new(2, 1, PixelLayout::Rgba8, vec![255, 0, 0, 255, 255, 0, 0, 255])
            .unwrap();
        let bgra = Frame::new(2, 1, PixelLayout::Bgra8, vec![0, 0, 255, 255, 0, 0, 255, 255])
            .unwrap();
        assert_eq!(rgba.to_gray(), bgra.to_gray());
        // Red is darker than white but not black
        let v = rgba.to_gray().get_pixel(0, 0).0[0];
        assert!(v > 20 && v < 200);
    }

    #[test]
    fn test_rgb_white_is_white() {
        let frame = Frame::new(1, 1, PixelLayout::Rgb8, vec![255, 255, 255]).unwrap();
        assert_eq!(frame.to_gray().get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_with_sequence() {
        let frame = Frame::from_gray(GrayImage::new(2, 2)).with_sequence(42);
        assert_eq!(frame.sequence(), 42);
    }
}
