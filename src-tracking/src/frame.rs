// ============================================================================
// Camera Frames
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

/// One camera frame. Pixel data is shared, so cloning is cheap.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Monotonic frame counter
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
    /// Packed pixel data (layout defined by the camera backend)
    pub pixels: Arc<[u8]>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, captured_at: Instant, pixels: Arc<[u8]>) -> Self {
        Self {
            index,
            width,
            height,
            captured_at,
            pixels,
        }
    }

    /// Frame without pixel data, for backends that track by other means
    pub fn blank(index: u64, width: u32, height: u32, captured_at: Instant) -> Self {
        Self::new(index, width, height, captured_at, Arc::from(Vec::new()))
    }
}

/// Source of camera frames driving the tracking loop
pub trait FrameSource: Send {
    /// Next frame, or `None` when the source is exhausted
    fn next_frame(&mut self) -> Option<Frame>;
}
