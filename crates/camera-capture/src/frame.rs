//! Video frame types and processing

use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbImage;

use crate::CameraError;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Decoded RGB video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Process-unique id; clones share it
    pub id: u64,
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number, starting at 1 for the first frame of a source
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u32) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, sequence)
    }

    /// Wrap a decoded image
    pub fn from_rgb_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Copy the pixels into an `image` buffer.
    ///
    /// Fails when the buffer length does not match `width * height * 3`.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                self.width as usize * self.height as usize * 3,
                self.width,
                self.height,
                self.data.len()
            ))
        })
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        let px = self.data.get(idx..idx + 3)?;
        Some([px[0], px[1], px[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_filled_frame_pixels() {
        let frame = VideoFrame::filled(4, 3, [10, 20, 30], 7);
        assert_eq!(frame.data.len(), 36);
        assert_eq!(frame.get_pixel(3, 2), Some([10, 20, 30]));
        assert_eq!(frame.get_pixel(4, 0), None);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_image_conversion() {
        let frame = VideoFrame::filled(8, 6, [1, 2, 3], 1);
        let image = frame.to_rgb_image().unwrap();
        assert_eq!(image.dimensions(), (8, 6));

        let back = VideoFrame::from_rgb_image(image, 0, 1);
        assert_eq!(back.data, frame.data);
        assert_eq!((back.width, back.height), (8, 6));
    }

    #[test]
    fn test_short_buffer_is_format_error() {
        let frame = VideoFrame::new(vec![0; 10], 4, 4, 0, 1);
        assert!(matches!(frame.to_rgb_image(), Err(CameraError::Format(_))));
    }

    #[test]
    fn test_frame_ids_unique_and_shared_by_clones() {
        let a = VideoFrame::filled(2, 2, [0, 0, 0], 1);
        let b = VideoFrame::filled(2, 2, [0, 0, 0], 1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.clone().id, a.id);
    }

    proptest! {
        #[test]
        fn filled_frame_has_colour_everywhere(
            w in 1u32..32, h in 1u32..32, x in 0u32..32, y in 0u32..32,
            rgb in any::<[u8; 3]>(),
        ) {
            let frame = VideoFrame::filled(w, h, rgb, 1);
            let expected = if x < w && y < h { Some(rgb) } else { None };
            prop_assert_eq!(frame.get_pixel(x, y), expected);
        }
    }
}
