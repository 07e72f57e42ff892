//! Multi-object tracking core for navguide
//!
//! Keeps a live set of tracked objects between sparse, slow external
//! detections:
//! - a fast local tracker moves each box every frame
//! - velocity is smoothed and extrapolated to a short horizon
//! - range is estimated from box size and classified into proximity zones
//! - lost tracks are re-acquired asynchronously with a per-track cooldown
//!
//! Data flow:
//! - Detector -> TrackSet::apply_detections -> local tracker (every tick)
//! - MotionPredictor -> ProximityZoneEvaluator -> published TrackSnapshot
//! - ReacquisitionScheduler -> completion queue -> TrackSet (single writer)

// Module declarations
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod distance;
pub mod frame;
pub mod geometry;
pub mod local_tracker;
pub mod modes;
pub mod predictor;
pub mod reacquisition;
pub mod sim;
pub mod snapshot;
pub mod track;
pub mod track_set;
pub mod zones;

// Re-exports for easier use
pub use config::{ConfigError, TrackingConfig, ZoneThresholds};
pub use coordinator::{EngineError, TrackingCommand, TrackingCoordinator, TrackingSetup};
pub use detector::{Detection, Detector, DetectorError, parse_detections};
pub use frame::{Frame, FrameSource};
pub use geometry::{BBox, Point};
pub use local_tracker::{LocalTracker, TrackerFactory, TrackerUpdate};
pub use modes::{AudioFocus, LabelFilter, ModeProfile, NavigationMode};
pub use predictor::{VelocityEstimator, predict};
pub use reacquisition::{ReacquisitionOutcome, ReacquisitionScheduler, RequestKind, RetryPolicy};
pub use snapshot::{SnapshotCell, SnapshotReader};
pub use track::{Track, TrackId, TrackSnapshot, TrackState, Velocity, Zone, normalize_label};
pub use track_set::{AdvanceReport, ApplyReport, StopTarget, TrackSet};
pub use zones::ProximityZoneEvaluator;
