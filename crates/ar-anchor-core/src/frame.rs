use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One camera frame as handed out by a camera stream.
///
/// Pixel data is shared, so handing the same frame to the estimator twice
/// (or to a worker thread) does not copy the image.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// Monotonic frame sequence number assigned by the stream.
    pub seq: u64,
    pub width: usize,
    pub height: usize,
    pub data: Arc<[u8]>, // row-major, format owned by the stream
}

impl VideoFrame {
    pub fn new(seq: u64, width: usize, height: usize, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            seq,
            width,
            height,
            data: data.into(),
        }
    }

    /// A frame carrying no pixels; useful for estimators that only need the
    /// sequence number.
    pub fn empty(seq: u64) -> Self {
        Self::new(seq, 0, 0, Vec::new())
    }
}

/// Output surface size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}
