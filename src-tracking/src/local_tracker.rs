// ============================================================================
// Local Tracker Interface
// ============================================================================
//
// A fast frame-to-frame visual tracker, one instance per track. Any
// implementation honoring this contract is substitutable.

use crate::frame::Frame;
use crate::geometry::BBox;

/// Result of one local tracker update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    pub bbox: BBox,
    pub success: bool,
    /// Match confidence, if the backend reports one
    pub confidence: Option<f32>,
}

impl TrackerUpdate {
    pub fn ok(bbox: BBox) -> Self {
        Self {
            bbox,
            success: true,
            confidence: None,
        }
    }

    pub fn failed(bbox: BBox) -> Self {
        Self {
            bbox,
            success: false,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Frame-to-frame tracker for a single object
pub trait LocalTracker: Send {
    /// (Re)initialize on `bbox` in `frame`
    fn init(&mut self, bbox: BBox, frame: &Frame);

    /// Follow the object into `frame`
    fn update(&mut self, frame: &Frame) -> TrackerUpdate;
}

/// Creates one tracker per track
pub trait TrackerFactory: Send {
    fn create(&self, label: &str) -> Box<dyn LocalTracker>;
}

impl<F> TrackerFactory for F
where
    F: Fn(&str) -> Box<dyn LocalTracker> + Send,
{
    fn create(&self, label: &str) -> Box<dyn LocalTracker> {
        self(label)
    }
}
