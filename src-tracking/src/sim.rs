// ============================================================================
// Scripted Scene
// ============================================================================
//
// Deterministic stand-in for the camera, the detector and the local tracker.
// Objects move linearly between two boxes; an occlusion window makes both the
// detector and the tracker lose sight of an object.

use crate::detector::{Detection, Detector, DetectorError};
use crate::frame::{Frame, FrameSource};
use crate::geometry::{BBox, Point};
use crate::local_tracker::{LocalTracker, TrackerFactory, TrackerUpdate};
use crate::track::normalize_label;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One object moving through the scene
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedObject {
    pub label: String,
    pub confidence: f32,
    pub from: BBox,
    pub to: BBox,
    /// Visible from this time on (s)
    pub appear_at: f64,
    /// Hidden during this window (s)
    pub occluded: Option<(f64, f64)>,
}

impl ScriptedObject {
    pub fn new(label: &str, confidence: f32, from: BBox, to: BBox) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            from,
            to,
            appear_at: 0.0,
            occluded: None,
        }
    }

    pub fn appearing_at(mut self, seconds: f64) -> Self {
        self.appear_at = seconds;
        self
    }

    pub fn occluded_between(mut self, start: f64, end: f64) -> Self {
        self.occluded = Some((start, end));
        self
    }

    fn visible_at(&self, t: f64) -> bool {
        t >= self.appear_at && !self.occluded.is_some_and(|(start, end)| t >= start && t < end)
    }
}

/// Deterministic scene played back at a fixed frame rate
#[derive(Debug, Clone)]
pub struct Scene {
    pub objects: Vec<ScriptedObject>,
    pub fps: f64,
    pub duration: f64,
}

impl Scene {
    pub fn new(objects: Vec<ScriptedObject>, fps: f64, duration: f64) -> Self {
        Self {
            objects,
            fps: fps.max(1.0),
            duration,
        }
    }

    /// Person crossing, phone approaching, static door, chair hidden for a while
    pub fn demo(duration: f64) -> Self {
        let objects = vec![
            ScriptedObject::new(
                "person",
                0.92,
                BBox::centered_at(Point::new(0.1, 0.5), 0.15, 0.45),
                BBox::centered_at(Point::new(0.9, 0.5), 0.15, 0.45),
            ),
            ScriptedObject::new(
                "Black Phone [on table]",
                0.85,
                BBox::centered_at(Point::new(0.55, 0.6), 0.07, 0.07),
                BBox::centered_at(Point::new(0.5, 0.55), 0.27, 0.27),
            )
            .appearing_at(1.0),
            ScriptedObject::new(
                "door",
                0.8,
                BBox::centered_at(Point::new(0.85, 0.45), 0.2, 0.6),
                BBox::centered_at(Point::new(0.85, 0.45), 0.2, 0.6),
            ),
            ScriptedObject::new(
                "chair",
                0.7,
                BBox::centered_at(Point::new(0.3, 0.75), 0.2, 0.25),
                BBox::centered_at(Point::new(0.3, 0.75), 0.2, 0.25),
            )
            .occluded_between(duration * 0.3, duration * 0.45),
        ];
        Self::new(objects, 30.0, duration)
    }

    /// Scene time of a frame (s)
    pub fn time_of(&self, frame: &Frame) -> f64 {
        frame.index as f64 / self.fps
    }

    /// Bounding box of `object` at scene time `t`
    pub fn bbox_at(&self, object: &ScriptedObject, t: f64) -> BBox {
        let progress = if self.duration > 0.0 {
            (t / self.duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        let lerp = |a: f32, b: f32| a + (b - a) * progress;
        let center = Point::new(
            lerp(object.from.center().x, object.to.center().x),
            lerp(object.from.center().y, object.to.center().y),
        );
        BBox::centered_at(
            center,
            lerp(object.from.width, object.to.width),
            lerp(object.from.height, object.to.height),
        )
    }

    /// What a perfect detector sees at time `t`
    pub fn detections_at(&self, t: f64) -> Vec<Detection> {
        self.objects
            .iter()
            .filter(|o| o.visible_at(t))
            .map(|o| Detection::new(&o.label, self.bbox_at(o, t), o.confidence))
            .collect()
    }

    pub fn frame_count(&self) -> u64 {
        (self.duration * self.fps).ceil() as u64
    }
}

// ----------------------------------------------------------------------------
// Frame source
// ----------------------------------------------------------------------------

/// Emits blank frames for the scene, then ends
pub struct SceneFrameSource {
    scene: Arc<Scene>,
    next_index: u64,
    started_at: Instant,
}

impl SceneFrameSource {
    pub fn new(scene: Arc<Scene>) -> Self {
        Self {
            scene,
            next_index: 0,
            started_at: Instant::now(),
        }
    }
}

impl FrameSource for SceneFrameSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.next_index >= self.scene.frame_count() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        let captured_at = self.started_at + Duration::from_secs_f64(index as f64 / self.scene.fps);
        Some(Frame::blank(index, 640, 480, captured_at))
    }
}

// ----------------------------------------------------------------------------
// Detector
// ----------------------------------------------------------------------------

/// Detector answering from the script after a fixed latency
pub struct SceneDetector {
    scene: Arc<Scene>,
    latency: Duration,
}

impl SceneDetector {
    pub fn new(scene: Arc<Scene>, latency: Duration) -> Self {
        Self { scene, latency }
    }
}

impl Detector for SceneDetector {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, Result<Vec<Detection>, DetectorError>> {
        let detections = self.scene.detections_at(self.scene.time_of(&frame));
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(detections)
        })
    }
}

// ----------------------------------------------------------------------------
// Local tracker
// ----------------------------------------------------------------------------

/// Follows the scripted object of its label closest to the last box
pub struct SceneTracker {
    scene: Arc<Scene>,
    key: String,
    bbox: BBox,
}

impl LocalTracker for SceneTracker {
    fn init(&mut self, bbox: BBox, _frame: &Frame) {
        self.bbox = bbox;
    }

    fn update(&mut self, frame: &Frame) -> TrackerUpdate {
        let t = self.scene.time_of(frame);
        let last = self.bbox.center();
        let nearest = self
            .scene
            .objects
            .iter()
            .filter(|o| normalize_label(&o.label) == self.key && o.visible_at(t))
            .map(|o| self.scene.bbox_at(o, t))
            .min_by(|a, b| a.center().distance(last).total_cmp(&b.center().distance(last)));

        match nearest {
            Some(bbox) => {
                self.bbox = bbox;
                TrackerUpdate::ok(bbox).with_confidence(0.9)
            }
            None => TrackerUpdate::failed(self.bbox),
        }
    }
}

/// Factory creating one `SceneTracker` per track
pub struct SceneTrackerFactory {
    scene: Arc<Scene>,
}

impl SceneTrackerFactory {
    pub fn new(scene: Arc<Scene>) -> Self {
        Self { scene }
    }
}

impl TrackerFactory for SceneTrackerFactory {
    fn create(&self, label: &str) -> Box<dyn LocalTracker> {
        Box::new(SceneTracker {
            scene: Arc::clone(&self.scene),
            key: normalize_label(label),
            bbox: BBox::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_motion() {
        let object = ScriptedObject::new(
            "person",
            0.9,
            BBox::centered_at(Point::new(0.2, 0.5), 0.1, 0.2),
            BBox::centered_at(Point::new(0.8, 0.5), 0.1, 0.2),
        );
        let scene = Scene::new(vec![object.clone()], 10.0, 2.0);
        let mid = scene.bbox_at(&object, 1.0);
        assert!((mid.center().x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_occlusion_hides_object() {
        let object = ScriptedObject::new("chair", 0.7, BBox::new(0.1, 0.1, 0.2, 0.2), BBox::new(0.1, 0.1, 0.2, 0.2))
            .occluded_between(1.0, 2.0);
        let scene = Scene::new(vec![object], 10.0, 5.0);
        assert_eq!(scene.detections_at(0.5).len(), 1);
        assert!(scene.detections_at(1.5).is_empty());
        assert_eq!(scene.detections_at(2.0).len(), 1);
    }

    #[test]
    fn test_tracker_fails_while_occluded() {
        let object = ScriptedObject::new("chair", 0.7, BBox::new(0.1, 0.1, 0.2, 0.2), BBox::new(0.1, 0.1, 0.2, 0.2))
            .occluded_between(1.0, 2.0);
        let scene = Arc::new(Scene::new(vec![object], 10.0, 5.0));
        let mut tracker = SceneTrackerFactory::new(Arc::clone(&scene)).create("Chair");
        let now = Instant::now();
        tracker.init(BBox::new(0.1, 0.1, 0.2, 0.2), &Frame::blank(0, 64, 48, now));
        assert!(tracker.update(&Frame::blank(5, 64, 48, now)).success);
        assert!(!tracker.update(&Frame::blank(15, 64, 48, now)).success);
    }

    #[test]
    fn test_frame_source_ends() {
        let scene = Arc::new(Scene::new(Vec::new(), 10.0, 0.5));
        let mut source = SceneFrameSource::new(scene);
        let mut count = 0;
        while source.next_frame().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }
}
