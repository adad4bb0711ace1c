use serde::{Deserialize, Serialize};

/// Shape of the preprocessed image a network consumes.
///
/// Images are resized to `width × height` and flattened channel-interleaved
/// (R, G, B, R, G, B, ...) with values in [0, 1]. Stored with every
/// checkpoint so inference applies the same preprocessing as training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    /// 1 for grayscale, 3 for RGB.
    pub channels: u32,
}

impl ImageShape {
    pub fn rgb(width: u32, height: u32) -> Self {
        ImageShape { width, height, channels: 3 }
    }

    /// Number of values in a flattened image.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        ImageShape::rgb(32, 32)
    }
}
