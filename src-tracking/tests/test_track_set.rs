//! TrackSet lifecycle tests: capacity, expiry, zones and tracker failure

use navguide_tracking::{
    BBox, Detection, DetectorError, Frame, LocalTracker, ModeProfile, Point, ReacquisitionOutcome, RequestKind,
    TrackSet, TrackState, TrackerFactory, TrackerUpdate, TrackingConfig, Zone,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Fakes
// ============================================================================

/// Tracker whose box is driven by the test through a shared cell
struct ScriptedTracker {
    position: Arc<Mutex<Option<BBox>>>,
}

impl LocalTracker for ScriptedTracker {
    fn init(&mut self, bbox: BBox, _frame: &Frame) {
        let mut position = self.position.lock();
        if position.is_none() {
            *position = Some(bbox);
        }
    }

    fn update(&mut self, _frame: &Frame) -> TrackerUpdate {
        match *self.position.lock() {
            Some(bbox) => TrackerUpdate::ok(bbox),
            None => TrackerUpdate::failed(BBox::default()),
        }
    }
}

/// Every tracker shares one cell; `None` makes all of them fail
fn scripted_factory(position: Arc<Mutex<Option<BBox>>>) -> Box<dyn TrackerFactory> {
    Box::new(move |_: &str| {
        Box::new(ScriptedTracker {
            position: Arc::clone(&position),
        }) as Box<dyn LocalTracker>
    })
}

struct FailingTracker;

impl LocalTracker for FailingTracker {
    fn init(&mut self, _bbox: BBox, _frame: &Frame) {}

    fn update(&mut self, _frame: &Frame) -> TrackerUpdate {
        TrackerUpdate::failed(BBox::default())
    }
}

struct SteadyTracker {
    bbox: BBox,
}

impl LocalTracker for SteadyTracker {
    fn init(&mut self, bbox: BBox, _frame: &Frame) {
        self.bbox = bbox;
    }

    fn update(&mut self, _frame: &Frame) -> TrackerUpdate {
        TrackerUpdate::ok(self.bbox)
    }
}

fn failing_factory() -> Box<dyn TrackerFactory> {
    Box::new(|_: &str| Box::new(FailingTracker) as Box<dyn LocalTracker>)
}

fn steady_factory() -> Box<dyn TrackerFactory> {
    Box::new(|_: &str| Box::new(SteadyTracker { bbox: BBox::default() }) as Box<dyn LocalTracker>)
}

fn frame(now: Instant) -> Frame {
    Frame::blank(0, 640, 480, now)
}

fn obstacle_at(x: f32, y: f32, confidence: f32) -> Detection {
    Detection::new("obstacle", BBox::centered_at(Point::new(x, y), 0.1, 0.1), confidence)
}

/// Square box a phone at `distance` meters would fill
fn phone_box(distance: f32) -> BBox {
    let side = 0.5f32.sqrt() * 0.3 / distance;
    BBox::centered_at(Point::new(0.5, 0.5), side, side)
}

fn full_set(now: Instant) -> TrackSet {
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), steady_factory());
    let detections: Vec<Detection> = [0.5, 0.6, 0.7, 0.8, 0.9]
        .iter()
        .enumerate()
        .map(|(i, &confidence)| obstacle_at(0.1 + 0.2 * i as f32, 0.5, confidence))
        .collect();
    let report = set.apply_detections(&detections, &frame(now), now);
    assert_eq!(report.created.len(), 5);
    set
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn test_sixth_detection_evicts_lowest_confidence() {
    let now = Instant::now();
    let mut set = full_set(now);
    let weakest = set.tracks().next().unwrap().id;

    let report = set.apply_detections(&[obstacle_at(0.5, 0.15, 0.95)], &frame(now), now);

    assert_eq!(report.evicted, vec![weakest]);
    assert_eq!(report.created.len(), 1);
    assert_eq!(set.len(), 5);
    assert!(set.get(weakest).is_none());
    assert!(set.tracks().all(|t| t.confidence >= 0.6));
}

#[test]
fn test_sixth_detection_dropped_when_least_confident() {
    let now = Instant::now();
    let mut set = full_set(now);
    let before: Vec<_> = set.tracks().map(|t| t.id).collect();

    let report = set.apply_detections(&[obstacle_at(0.5, 0.15, 0.4)], &frame(now), now);

    assert_eq!(report.dropped, 1);
    assert!(report.created.is_empty() && report.evicted.is_empty());
    let after: Vec<_> = set.tracks().map(|t| t.id).collect();
    assert_eq!(before, after);
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_lost_track_expires_and_leaves_snapshot() {
    let start = Instant::now();
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), failing_factory());
    let id = set.apply_detections(&[obstacle_at(0.5, 0.5, 0.9)], &frame(start), start).created[0];

    let t1 = start + Duration::from_millis(20);
    let report = set.advance(Duration::from_millis(20), &frame(t1), t1);
    assert_eq!(report.lost, vec![id]);

    let t2 = start + Duration::from_secs(4);
    set.advance(Duration::from_millis(20), &frame(t2), t2);
    assert!(set.snapshot(t2).get(id).is_some());

    let t3 = start + Duration::from_millis(5100);
    let report = set.advance(Duration::from_millis(20), &frame(t3), t3);
    assert_eq!(report.expired, vec![id]);
    assert!(set.snapshot(t3).get(id).is_none());
}

#[test]
fn test_unverified_tracking_track_expires() {
    let start = Instant::now();
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), steady_factory());
    let id = set.apply_detections(&[obstacle_at(0.5, 0.5, 0.9)], &frame(start), start).created[0];

    for second in 1..=30 {
        let now = start + Duration::from_secs(second);
        let report = set.advance(Duration::from_secs(1), &frame(now), now);
        assert!(report.expired.is_empty(), "expired early at {}s", second);
    }
    assert_eq!(set.get(id).unwrap().state, TrackState::Tracking);

    let now = start + Duration::from_secs(31);
    let report = set.advance(Duration::from_secs(1), &frame(now), now);
    assert_eq!(report.expired, vec![id]);
    assert!(set.is_empty());
}

// ============================================================================
// Zones
// ============================================================================

#[test]
fn test_approaching_phone_passes_through_caution() {
    let start = Instant::now();
    let position = Arc::new(Mutex::new(None));
    let mut set = TrackSet::new(
        TrackingConfig::default(),
        ModeProfile::default(),
        scripted_factory(Arc::clone(&position)),
    );
    let id = set
        .apply_detections(&[Detection::new("phone", phone_box(3.0), 0.9)], &frame(start), start)
        .created[0];
    assert_eq!(set.get(id).unwrap().zone, Zone::Safe);

    let mut zones = vec![Zone::Safe];
    let mut now = start;
    for distance in [3.0, 2.5, 2.0, 1.5, 1.2, 1.0, 0.8, 0.8] {
        *position.lock() = Some(phone_box(distance));
        now += Duration::from_millis(100);
        set.advance(Duration::from_millis(100), &frame(now), now);
        let track = set.get(id).unwrap();
        assert_eq!(track.state, TrackState::Tracking);
        if zones.last() != Some(&track.zone) {
            zones.push(track.zone);
        }
    }
    assert_eq!(zones, vec![Zone::Safe, Zone::Caution, Zone::Warning]);
}

// ============================================================================
// Tracker failure
// ============================================================================

#[test]
fn test_tracker_failure_loses_track_in_one_advance() {
    let start = Instant::now();
    let position = Arc::new(Mutex::new(None));
    let mut set = TrackSet::new(
        TrackingConfig::default(),
        ModeProfile::default(),
        scripted_factory(Arc::clone(&position)),
    );
    let id = set.apply_detections(&[obstacle_at(0.5, 0.5, 0.9)], &frame(start), start).created[0];

    let t1 = start + Duration::from_millis(20);
    set.advance(Duration::from_millis(20), &frame(t1), t1);
    assert_eq!(set.get(id).unwrap().state, TrackState::Tracking);

    *position.lock() = None;
    let t2 = t1 + Duration::from_millis(20);
    let report = set.advance(Duration::from_millis(20), &frame(t2), t2);
    assert_eq!(report.lost, vec![id]);
    assert_eq!(set.get(id).unwrap().state, TrackState::Lost);
    assert_eq!(set.unconfirmed_ids(), vec![id]);
}

#[test]
fn test_redetection_recovers_lost_track() {
    let start = Instant::now();
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), failing_factory());
    let id = set.apply_detections(&[obstacle_at(0.5, 0.5, 0.9)], &frame(start), start).created[0];

    let t1 = start + Duration::from_millis(20);
    set.advance(Duration::from_millis(20), &frame(t1), t1);
    assert!(set.mark_reacquiring(id));

    let t2 = start + Duration::from_secs(1);
    let report = set.apply_detections(&[obstacle_at(0.53, 0.5, 0.8)], &frame(t2), t2);
    assert_eq!(report.updated, vec![id]);
    let track = set.get(id).unwrap();
    assert_eq!(track.state, TrackState::Tracking);
    assert_eq!(track.confidence, 0.8);
    assert_eq!(track.last_detected_at, t2);
}

#[test]
fn test_failed_reacquisition_keeps_track_until_expiry() {
    let start = Instant::now();
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), failing_factory());
    let id = set.apply_detections(&[obstacle_at(0.5, 0.5, 0.9)], &frame(start), start).created[0];

    let t1 = start + Duration::from_millis(20);
    set.advance(Duration::from_millis(20), &frame(t1), t1);
    assert!(set.mark_reacquiring(id));

    // Detector timed out on every attempt: merged as an empty result
    let outcome = ReacquisitionOutcome {
        kind: RequestKind::Reacquire(id),
        frame: frame(t1),
        result: Err(DetectorError::Timeout),
        attempts: 3,
    };
    let t2 = start + Duration::from_secs(3);
    let report = set.apply_detections(outcome.detections(), &outcome.frame, t2);
    assert!(report.updated.is_empty() && report.created.is_empty());
    assert_eq!(set.get(id).unwrap().state, TrackState::Reacquiring);

    let t3 = start + Duration::from_millis(4900);
    let report = set.advance(Duration::from_millis(20), &frame(t3), t3);
    assert!(report.expired.is_empty());
    assert_eq!(set.get(id).unwrap().state, TrackState::Reacquiring);

    let t4 = start + Duration::from_millis(5100);
    let report = set.advance(Duration::from_millis(20), &frame(t4), t4);
    assert_eq!(report.expired, vec![id]);
    assert!(set.get(id).is_none());
}

#[test]
fn test_huge_durations_do_not_stop_advance() {
    let start = Instant::now();
    let config = TrackingConfig {
        max_unverified: 1.0e30,
        expire_after: 1.0e30,
        ..TrackingConfig::default()
    };
    let mut set = TrackSet::new(config, ModeProfile::default(), steady_factory());
    let id = set.apply_detections(&[obstacle_at(0.5, 0.5, 0.9)], &frame(start), start).created[0];

    let later = start + Duration::from_secs(3600);
    let report = set.advance(Duration::from_millis(20), &frame(later), later);
    assert!(report.expired.is_empty());
    assert_eq!(set.get(id).unwrap().state, TrackState::Tracking);
}

// ============================================================================
// Detection sanitizing
// ============================================================================

#[test]
fn test_out_of_frame_detection_is_clamped() {
    let now = Instant::now();
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), steady_factory());
    let detection = Detection {
        label: "obstacle".to_string(),
        context: None,
        bbox: BBox {
            x: 0.9,
            y: 0.9,
            width: 0.5,
            height: 0.5,
        },
        confidence: 0.9,
    };

    let report = set.apply_detections(&[detection], &frame(now), now);
    let track = set.get(report.created[0]).unwrap();
    assert!(track.bbox.is_within_frame());
    assert!((track.bbox.width - 0.1).abs() < 1e-6);
    assert!(track.distance.is_finite());
}

#[test]
fn test_invalid_detections_are_rejected() {
    let now = Instant::now();
    let mut set = TrackSet::new(TrackingConfig::default(), ModeProfile::default(), steady_factory());
    let valid = obstacle_at(0.5, 0.5, 0.9);
    let non_finite = Detection {
        bbox: BBox {
            x: f32::NAN,
            ..valid.bbox
        },
        ..valid.clone()
    };
    let empty = Detection {
        bbox: BBox {
            x: 1.2,
            ..valid.bbox
        },
        ..valid.clone()
    };
    let bad_confidence = Detection {
        confidence: f32::NAN,
        ..valid.clone()
    };

    let report = set.apply_detections(&[non_finite, empty, bad_confidence], &frame(now), now);
    assert_eq!(report.rejected, 3);
    assert!(set.is_empty());
}
