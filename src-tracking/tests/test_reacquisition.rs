//! Re-acquisition scheduling and tracking coordinator tests
//!
//! Scheduler tests drive time explicitly; coordinator tests run the real
//! tracking thread against a scripted scene and poll published snapshots.

use futures::future::BoxFuture;
use navguide_tracking::sim::{Scene, SceneDetector, SceneFrameSource, SceneTrackerFactory, ScriptedObject};
use navguide_tracking::{
    BBox, Detection, Detector, DetectorError, Frame, NavigationMode, Point, ReacquisitionScheduler,
    RequestKind, SnapshotReader, StopTarget, TrackId, TrackSnapshot, TrackState, TrackingConfig,
    TrackingCoordinator, TrackingSetup,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// Helpers
// ============================================================================

/// Counts calls and answers with nothing after `delay`
struct CountingDetector {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingDetector {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for CountingDetector {
    fn detect(&self, _frame: Frame) -> BoxFuture<'static, Result<Vec<Detection>, DetectorError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(Vec::new())
        })
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap()
}

fn wait_for(reader: &SnapshotReader, predicate: impl Fn(&TrackSnapshot) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if predicate(&reader.load()) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

// ============================================================================
// Scheduler
// ============================================================================

#[test]
fn test_one_request_per_cooldown() {
    let rt = runtime();
    let (tx, rx) = crossbeam::channel::unbounded();
    let detector = CountingDetector::new(Duration::ZERO);
    let mut scheduler =
        ReacquisitionScheduler::new(rt.handle().clone(), detector.clone(), &TrackingConfig::default(), tx);

    let start = Instant::now();
    let frame = Frame::blank(0, 640, 480, start);
    let lost = [TrackId(3)];

    // Poll every quantum for 1.5 s of simulated time
    for step in 0..30u64 {
        let now = start + Duration::from_millis(step * 50);
        for id in scheduler.poll(now, &lost, &frame) {
            assert_eq!(id, TrackId(3));
            let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert!(outcome.detections().is_empty());
            scheduler.complete(outcome.kind);
        }
        if step == 19 {
            assert_eq!(detector.calls(), 1, "more than one request inside the cooldown");
        }
    }
    assert_eq!(detector.calls(), 2);
    assert_eq!(scheduler.dispatched(), 2);
}

#[test]
fn test_no_second_request_while_in_flight() {
    let rt = runtime();
    let (tx, _rx) = crossbeam::channel::unbounded();
    let detector = CountingDetector::new(Duration::from_secs(10));
    let mut scheduler =
        ReacquisitionScheduler::new(rt.handle().clone(), detector.clone(), &TrackingConfig::default(), tx);

    let start = Instant::now();
    let frame = Frame::blank(0, 640, 480, start);
    assert_eq!(scheduler.poll(start, &[TrackId(1)], &frame).len(), 1);
    assert!(scheduler.poll(start + Duration::from_secs(2), &[TrackId(1)], &frame).is_empty());
    assert!(scheduler.is_in_flight(RequestKind::Reacquire(TrackId(1))));
}

#[test]
fn test_cancel_aborts_request() {
    let rt = runtime();
    let (tx, rx) = crossbeam::channel::unbounded();
    let detector = CountingDetector::new(Duration::from_secs(10));
    let mut scheduler =
        ReacquisitionScheduler::new(rt.handle().clone(), detector.clone(), &TrackingConfig::default(), tx);

    let start = Instant::now();
    let frame = Frame::blank(0, 640, 480, start);
    scheduler.poll(start, &[TrackId(1), TrackId(2)], &frame);
    assert_eq!(scheduler.in_flight(), 2);

    scheduler.cancel(&[TrackId(1)]);
    assert_eq!(scheduler.in_flight(), 1);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_scan_respects_interval() {
    let rt = runtime();
    let (tx, rx) = crossbeam::channel::unbounded();
    let detector = CountingDetector::new(Duration::ZERO);
    let mut scheduler =
        ReacquisitionScheduler::new(rt.handle().clone(), detector.clone(), &TrackingConfig::default(), tx);

    let start = Instant::now();
    let frame = Frame::blank(0, 640, 480, start);
    let interval = Duration::from_secs(2);
    assert!(scheduler.scan(start, interval, &frame));
    let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(outcome.kind, RequestKind::Scan);
    scheduler.complete(outcome.kind);

    assert!(!scheduler.scan(start + Duration::from_secs(1), interval, &frame));
    assert!(scheduler.scan(start + Duration::from_secs(2), interval, &frame));
}

// ============================================================================
// Coordinator
// ============================================================================

fn demo_scene() -> Arc<Scene> {
    Arc::new(Scene::new(
        vec![
            ScriptedObject::new(
                "person",
                0.9,
                BBox::centered_at(Point::new(0.2, 0.5), 0.15, 0.4),
                BBox::centered_at(Point::new(0.4, 0.5), 0.15, 0.4),
            ),
            ScriptedObject::new(
                "door",
                0.8,
                BBox::centered_at(Point::new(0.8, 0.4), 0.2, 0.6),
                BBox::centered_at(Point::new(0.8, 0.4), 0.2, 0.6),
            ),
        ],
        30.0,
        60.0,
    ))
}

fn start_coordinator(scene: &Arc<Scene>) -> TrackingCoordinator {
    let config = TrackingConfig {
        scan_interval: 0.0,
        ..TrackingConfig::default()
    };
    TrackingCoordinator::new(TrackingSetup {
        config,
        mode: NavigationMode::Exploration,
        target: String::new(),
        detector: Arc::new(SceneDetector::new(Arc::clone(scene), Duration::ZERO)),
        factory: Box::new(SceneTrackerFactory::new(Arc::clone(scene))),
        source: Box::new(SceneFrameSource::new(Arc::clone(scene))),
        tick: Duration::from_millis(10),
    })
    .unwrap()
}

#[test]
fn test_coordinator_tracks_detections() {
    let scene = demo_scene();
    let mut coordinator = start_coordinator(&scene);
    let reader = coordinator.snapshot_reader();

    let frame = Frame::blank(0, 640, 480, Instant::now());
    coordinator.apply_detections(scene.detections_at(0.0), frame).unwrap();

    assert!(wait_for(&reader, |s| {
        s.len() == 2 && s.iter().all(|t| t.state == TrackState::Tracking)
    }));
    coordinator.shutdown();
}

#[test]
fn test_mode_change_clears_tracks() {
    let scene = demo_scene();
    let coordinator = start_coordinator(&scene);
    let reader = coordinator.snapshot_reader();

    let frame = Frame::blank(0, 640, 480, Instant::now());
    coordinator.apply_detections(scene.detections_at(0.0), frame).unwrap();
    assert!(wait_for(&reader, |s| s.len() == 2));

    coordinator.set_mode(NavigationMode::Social, None).unwrap();
    assert!(wait_for(&reader, |s| s.len() == 1 && s.tracks[0].label == "person"));

    coordinator.stop_tracking(StopTarget::All).unwrap();
    assert!(wait_for(&reader, |s| s.is_empty()));
}

#[test]
fn test_start_tracking_finds_target() {
    let scene = demo_scene();
    let coordinator = start_coordinator(&scene);
    let reader = coordinator.snapshot_reader();

    // Wait for the first frame before asking for a target scan
    std::thread::sleep(Duration::from_millis(50));
    coordinator.start_tracking("door").unwrap();
    assert!(wait_for(&reader, |s| s.len() == 1 && s.tracks[0].label == "door"));
}
