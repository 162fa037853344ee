use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::frame::ImageSample;

/// Receives every decoded frame after it has been timed.
pub trait FrameSink: Send {
    fn show(&mut self, frame: &ImageSample) -> Result<()>;
}

/// Drops frames on the floor.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _frame: &ImageSample) -> Result<()> {
        Ok(())
    }
}

/// Keeps the most recent frame on disk as `latest_frame.npy`.
#[derive(Debug)]
pub struct NpyFrameSink {
    path: PathBuf,
    written: u64,
}

impl NpyFrameSink {
    pub const FILE_NAME: &'static str = "latest_frame.npy";

    /// Store frames under `dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create frame directory {:?}", dir))?;
        Ok(Self { path: dir.join(Self::FILE_NAME), written: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for NpyFrameSink {
    fn show(&mut self, frame: &ImageSample) -> Result<()> {
        ndarray_npy::write_npy(&self.path, &frame.pixels)
            .with_context(|| format!("Failed to write frame to {:?}", self.path))?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameShape;
    use ndarray::Array3;
    use tempfile::tempdir;

    #[test]
    fn npy_sink_overwrites_latest_frame() {
        let dir = tempdir().unwrap();
        let mut sink = NpyFrameSink::new(dir.path().join("frames")).unwrap();

        let first = ImageSample::from_raw("cam", vec![1u8; 12], FrameShape::new(1, 3, 4)).unwrap();
        let second = ImageSample::from_raw("cam", (0..12).collect(), FrameShape::new(1, 3, 4)).unwrap();
        sink.show(&first).unwrap();
        sink.show(&second).unwrap();
        assert_eq!(sink.frames_written(), 2);

        let stored: Array3<u8> = ndarray_npy::read_npy(sink.path()).unwrap();
        assert_eq!(stored, second.pixels);
    }
}
