// ============================================================================
// Track Types
// ============================================================================

use crate::geometry::{BBox, Point};
use crate::modes::AudioFocus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Stable track identifier, never reused within a TrackSet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle stage of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    /// Reported by the detector, not yet confirmed by local tracking
    Acquired,
    /// Local tracker is actively following the object
    Tracking,
    /// Local tracker lost the object
    Lost,
    /// A re-acquisition request has been dispatched
    Reacquiring,
    /// Terminal
    Expired,
}

impl TrackState {
    /// States in which the track keeps aging towards expiry while unconfirmed
    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, TrackState::Lost | TrackState::Reacquiring)
    }

    /// States that produce an audio cue
    pub fn is_audible(&self) -> bool {
        matches!(self, TrackState::Tracking | TrackState::Reacquiring)
    }
}

/// Discretized proximity risk level, ordered by urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    Safe,
    Caution,
    Warning,
}

impl Zone {
    pub fn level(&self) -> u8 {
        match self {
            Zone::Safe => 0,
            Zone::Caution => 1,
            Zone::Warning => 2,
        }
    }

    pub fn from_level(level: u8) -> Zone {
        match level {
            0 => Zone::Safe,
            1 => Zone::Caution,
            _ => Zone::Warning,
        }
    }
}

/// Velocity estimate; unset until two position samples exist
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Velocity {
    #[default]
    Unset,
    Known(Point),
}

impl Velocity {
    pub fn known(&self) -> Option<Point> {
        match self {
            Velocity::Unset => None,
            Velocity::Known(v) => Some(*v),
        }
    }
}

/// One tracked object
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    /// Label as reported by the detector (e.g. "Black Phone")
    pub label: String,
    /// Optional spatial context reported with the label (e.g. "on desk")
    pub context: Option<String>,
    pub bbox: BBox,
    /// Estimated range in meters
    pub distance: f32,
    pub velocity: Velocity,
    pub predicted_position: Point,
    pub confidence: f32,
    pub zone: Zone,
    pub state: TrackState,
    /// Threat score in [0, 1] (size and centrality)
    pub threat: f32,
    pub created_at: Instant,
    pub last_detected_at: Instant,
    pub last_updated_at: Instant,
}

impl Track {
    /// Normalized label key used for matching and signature lookup
    pub fn key(&self) -> String {
        normalize_label(&self.label)
    }

    pub fn position(&self) -> Point {
        self.bbox.center()
    }
}

/// Immutable view of all live tracks at one instant
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    /// Monotonic publication counter
    pub generation: u64,
    pub taken_at: Instant,
    /// Live tracks in insertion order
    pub tracks: Arc<[Track]>,
    /// Audio emphasis of the mode the snapshot was taken in
    pub focus: AudioFocus,
}

impl TrackSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            taken_at: Instant::now(),
            tracks: Arc::from(Vec::new()),
            focus: AudioFocus::All,
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }
}

/// Normalize a detector label: lower-case, drop a bracketed context,
/// keep the last word ("Red Cup [in hand]" -> "cup")
pub fn normalize_label(label: &str) -> String {
    let without_context = match label.find('[') {
        Some(idx) => &label[..idx],
        None => label,
    };
    without_context
        .split_whitespace()
        .last()
        .unwrap_or("")
        .to_lowercase()
}
