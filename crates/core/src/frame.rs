use std::fmt;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// height × width × channels of an uncompressed 8-bit frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FrameShape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self { height, width, channels }
    }

    /// Number of bytes a frame of this shape occupies.
    pub fn byte_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }
}

impl Default for FrameShape {
    /// The 240×512 RGBA layout of the default `fpv_cam` camera.
    fn default() -> Self {
        Self::new(240, 512, 4)
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("cannot reshape {len} bytes into a {shape} frame ({expected} bytes expected)")]
pub struct ShapeMismatch {
    pub len: usize,
    pub shape: FrameShape,
    pub expected: usize,
}

/// One decoded camera frame. Not retained past the poll that produced it.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub camera_name: String,
    pub pixels: Array3<u8>,
}

impl ImageSample {
    /// Reshape a raw row-major buffer into a pixel grid.
    pub fn from_raw(
        camera_name: impl Into<String>,
        bytes: Vec<u8>,
        shape: FrameShape,
    ) -> Result<Self, ShapeMismatch> {
        let mismatch = |len| ShapeMismatch { len, shape, expected: shape.byte_len() };
        if bytes.len() != shape.byte_len() {
            return Err(mismatch(bytes.len()));
        }
        let len = bytes.len();
        let pixels = Array3::from_shape_vec((shape.height, shape.width, shape.channels), bytes)
            .map_err(|_| mismatch(len))?;
        Ok(Self { camera_name: camera_name.into(), pixels })
    }

    pub fn shape(&self) -> FrameShape {
        let (height, width, channels) = self.pixels.dim();
        FrameShape { height, width, channels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshapes_row_major() {
        let bytes: Vec<u8> = (0..24).collect();
        let sample = ImageSample::from_raw("cam", bytes, FrameShape::new(2, 3, 4)).unwrap();
        assert_eq!(sample.shape(), FrameShape::new(2, 3, 4));
        assert_eq!(sample.pixels[[0, 0, 0]], 0);
        assert_eq!(sample.pixels[[0, 1, 0]], 4);
        assert_eq!(sample.pixels[[1, 0, 0]], 12);
        assert_eq!(sample.pixels[[1, 2, 3]], 23);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = ImageSample::from_raw("cam", vec![0u8; 10], FrameShape::default()).unwrap_err();
        assert_eq!(err.len, 10);
        assert_eq!(err.expected, 240 * 512 * 4);
        assert!(err.to_string().contains("240x512x4"));
    }
}
