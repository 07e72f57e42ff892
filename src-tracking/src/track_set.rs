// ============================================================================
// Track Set - Object Manager and Track State Machine
// ============================================================================
//
// ACQUIRED -> TRACKING -> LOST -> REACQUIRING -> TRACKING | EXPIRED
//
// The TrackSet is the only writer of Track state. Detections are a periodic
// correction signal; between them the local trackers move the boxes.
// Consumers only ever see immutable snapshots.

use crate::config::TrackingConfig;
use crate::detector::Detection;
use crate::distance::{estimate_distance, threat_score};
use crate::frame::Frame;
use crate::geometry::BBox;
use crate::local_tracker::{LocalTracker, TrackerFactory, TrackerUpdate};
use crate::modes::ModeProfile;
use crate::predictor::{VelocityEstimator, predict};
use crate::track::{Track, TrackId, TrackSnapshot, TrackState, normalize_label};
use crate::zones::ProximityZoneEvaluator;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What `stop_tracking` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopTarget {
    Label(String),
    All,
}

/// Outcome of `apply_detections`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub created: Vec<TrackId>,
    pub updated: Vec<TrackId>,
    pub evicted: Vec<TrackId>,
    /// Detections refused because every live track was more confident
    pub dropped: usize,
    /// Detections for labels outside the mode's filter
    pub ignored: usize,
    /// Detections with a non-finite or empty box or a non-finite confidence
    pub rejected: usize,
}

/// Outcome of `advance`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    /// Tracks that transitioned to LOST in this call
    pub lost: Vec<TrackId>,
    /// Tracks removed after expiring
    pub expired: Vec<TrackId>,
}

/// Mutable per-track state that never leaves the TrackSet
struct TrackEntry {
    track: Track,
    tracker: Box<dyn LocalTracker>,
    motion: VelocityEstimator,
}

/// Collection of live tracks, insertion-ordered
pub struct TrackSet {
    config: TrackingConfig,
    profile: ModeProfile,
    zones: ProximityZoneEvaluator,
    factory: Box<dyn TrackerFactory>,
    entries: Vec<TrackEntry>,
    next_id: u64,
    revision: u64,
}

impl TrackSet {
    pub fn new(config: TrackingConfig, profile: ModeProfile, factory: Box<dyn TrackerFactory>) -> Self {
        let zones = ProximityZoneEvaluator::new(config.zones.clone());
        Self {
            config,
            profile,
            zones,
            factory,
            entries: Vec::new(),
            next_id: 1,
            revision: 0,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn profile(&self) -> &ModeProfile {
        &self.profile
    }

    /// Effective track limit for the current mode
    pub fn capacity(&self) -> usize {
        self.config.max_tracks.min(self.profile.max_objects).max(1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.entries.iter().map(|e| &e.track).find(|t| t.id == id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter().map(|e| &e.track)
    }

    /// Ids of tracks waiting for re-acquisition (LOST or REACQUIRING)
    pub fn unconfirmed_ids(&self) -> Vec<TrackId> {
        self.tracks()
            .filter(|t| t.state.is_unconfirmed())
            .map(|t| t.id)
            .collect()
    }

    /// Immutable copy of all live tracks
    pub fn snapshot(&self, now: Instant) -> TrackSnapshot {
        let tracks: Vec<Track> = self.tracks().cloned().collect();
        TrackSnapshot {
            generation: self.revision,
            taken_at: now,
            tracks: Arc::from(tracks),
            focus: self.profile.audio_focus.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Detections
    // ------------------------------------------------------------------------

    /// Merge external detections taken on `frame`
    pub fn apply_detections(&mut self, detections: &[Detection], frame: &Frame, now: Instant) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut matched: HashSet<TrackId> = HashSet::new();

        for detection in detections {
            if !self.profile.label_filter.accepts(&detection.label) {
                report.ignored += 1;
                continue;
            }
            let Some(detection) = sanitize(detection) else {
                log::debug!("Rejecting detection '{}' with invalid box {:?}", detection.label, detection.bbox);
                report.rejected += 1;
                continue;
            };
            let detection = &detection;

            match self.find_match(detection, &matched) {
                Some((index, iou)) => {
                    let id = self.entries[index].track.id;
                    self.update_from_detection(index, detection, iou, frame, now);
                    matched.insert(id);
                    report.updated.push(id);
                }
                None => {
                    if let Some(id) = self.admit(detection, frame, now, &mut report) {
                        matched.insert(id);
                        report.created.push(id);
                    }
                }
            }
        }

        self.revision += 1;
        report
    }

    /// Best live track of the same label overlapping or near the detection
    fn find_match(&self, detection: &Detection, matched: &HashSet<TrackId>) -> Option<(usize, f32)> {
        let key = normalize_label(&detection.label);
        let center = detection.bbox.center();

        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !matched.contains(&e.track.id) && e.track.key() == key)
            .filter_map(|(index, e)| {
                let iou = e.track.bbox.iou(&detection.bbox);
                let near = e.track.bbox.center().distance(center) <= self.config.match_center_distance;
                (iou >= self.config.match_iou || near).then_some((index, iou, e.track.bbox.center().distance(center)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.2.total_cmp(&a.2)))
            .map(|(index, iou, _)| (index, iou))
    }

    fn update_from_detection(&mut self, index: usize, detection: &Detection, iou: f32, frame: &Frame, now: Instant) {
        let adopt_iou = self.config.adopt_iou;
        let entry = &mut self.entries[index];
        let previous = entry.track.state;

        // A tracking box is fresher than a slow detection unless they agree
        let adopt = previous != TrackState::Tracking || iou >= adopt_iou;
        if adopt {
            let elapsed = now.saturating_duration_since(entry.track.last_updated_at);
            entry.track.bbox = detection.bbox;
            entry.tracker.init(detection.bbox, frame);
            if previous == TrackState::Tracking {
                entry.motion.push(detection.bbox.center(), elapsed);
            } else {
                entry.motion.reset(detection.bbox.center());
            }
            entry.track.velocity = entry.motion.velocity();
        }

        entry.track.label = detection.label.clone();
        if detection.context.is_some() {
            entry.track.context = detection.context.clone();
        }
        entry.track.confidence = detection.confidence;
        entry.track.last_detected_at = now;
        entry.track.last_updated_at = now;
        entry.track.state = TrackState::Tracking;

        if previous.is_unconfirmed() {
            log::info!("Track {} ({}) re-acquired", entry.track.id, entry.track.label);
        }
        refresh_derived(entry, &self.zones, self.config.predict_horizon());
    }

    /// Create a track for an unmatched detection, evicting if at capacity
    fn admit(&mut self, detection: &Detection, frame: &Frame, now: Instant, report: &mut ApplyReport) -> Option<TrackId> {
        let capacity = self.capacity();
        if self.entries.len() >= capacity {
            let lowest = self.lowest_confidence_index()?;
            if detection.confidence < self.entries[lowest].track.confidence {
                log::debug!(
                    "Dropping detection '{}' ({:.2}): every live track is more confident",
                    detection.label,
                    detection.confidence
                );
                report.dropped += 1;
                return None;
            }
            while self.entries.len() >= capacity {
                let Some(index) = self.lowest_confidence_index() else {
                    break;
                };
                let mut evicted = self.entries.remove(index);
                evicted.track.state = TrackState::Expired;
                log::info!(
                    "Evicted track {} ({}, confidence {:.2}) to make room for '{}'",
                    evicted.track.id,
                    evicted.track.label,
                    evicted.track.confidence,
                    detection.label
                );
                report.evicted.push(evicted.track.id);
            }
        }

        let id = TrackId(self.next_id);
        self.next_id += 1;

        let mut tracker = self.factory.create(&detection.label);
        tracker.init(detection.bbox, frame);
        let mut motion = VelocityEstimator::new(self.config.velocity_alpha, self.config.velocity_window);
        motion.reset(detection.bbox.center());

        let distance = estimate_distance(&detection.bbox, &detection.label);
        let track = Track {
            id,
            label: detection.label.clone(),
            context: detection.context.clone(),
            bbox: detection.bbox,
            distance,
            velocity: motion.velocity(),
            predicted_position: detection.bbox.center(),
            confidence: detection.confidence,
            zone: self.zones.evaluate(distance, None),
            state: TrackState::Acquired,
            threat: threat_score(&detection.bbox),
            created_at: now,
            last_detected_at: now,
            last_updated_at: now,
        };
        log::info!(
            "Acquired track {} ({}) at {:.1} m, zone {:?}",
            id,
            track.label,
            track.distance,
            track.zone
        );
        self.entries.push(TrackEntry { track, tracker, motion });
        Some(id)
    }

    fn lowest_confidence_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.track.confidence.total_cmp(&b.1.track.confidence))
            .map(|(index, _)| index)
    }

    // ------------------------------------------------------------------------
    // Per-quantum update
    // ------------------------------------------------------------------------

    /// Advance every track by one quantum of length `dt`
    pub fn advance(&mut self, dt: Duration, frame: &Frame, now: Instant) -> AdvanceReport {
        let mut report = AdvanceReport::default();
        self.expire(now, &mut report);

        let horizon = self.config.predict_horizon();
        let decay = self.config.confidence_decay;
        for entry in &mut self.entries {
            match entry.track.state {
                TrackState::Acquired | TrackState::Tracking => {
                    let update = entry.tracker.update(frame);
                    if is_tracker_failure(&self.config, &entry.track.bbox, &update) {
                        entry.track.state = TrackState::Lost;
                        log::info!("Track {} ({}) lost by local tracker", entry.track.id, entry.track.label);
                        report.lost.push(entry.track.id);
                    } else {
                        entry.track.bbox = update.bbox;
                        entry.motion.push(update.bbox.center(), dt);
                        entry.track.velocity = entry.motion.velocity();
                        entry.track.state = TrackState::Tracking;
                        entry.track.last_updated_at = now;
                    }
                }
                TrackState::Lost | TrackState::Reacquiring => {
                    entry.track.confidence *= (-decay * dt.as_secs_f32()).exp();
                }
                TrackState::Expired => {}
            }
            refresh_derived(entry, &self.zones, horizon);
        }

        self.revision += 1;
        report
    }

    /// Remove tracks whose detections or updates are too old
    fn expire(&mut self, now: Instant, report: &mut AdvanceReport) {
        let expire_after = self.config.expire_after();
        let max_unverified = self.config.max_unverified();

        self.entries.retain_mut(|entry| {
            let track = &mut entry.track;
            let since_detected = now.saturating_duration_since(track.last_detected_at);
            let since_updated = now.saturating_duration_since(track.last_updated_at);

            let expired = (track.state.is_unconfirmed() && since_detected > expire_after)
                || since_updated > expire_after
                || (track.state == TrackState::Tracking && since_detected > max_unverified);
            if expired {
                track.state = TrackState::Expired;
                log::info!(
                    "Track {} ({}) expired ({:.1}s since last detection)",
                    track.id,
                    track.label,
                    since_detected.as_secs_f32()
                );
                report.expired.push(track.id);
            }
            !expired
        });
    }

    /// Record that a re-acquisition request is in flight for `id`
    pub fn mark_reacquiring(&mut self, id: TrackId) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.track.id == id) else {
            return false;
        };
        if !entry.track.state.is_unconfirmed() {
            return false;
        }
        entry.track.state = TrackState::Reacquiring;
        self.revision += 1;
        true
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Remove tracks by label (or all); returns the removed ids
    pub fn stop_tracking(&mut self, target: &StopTarget) -> Vec<TrackId> {
        let removed = match target {
            StopTarget::All => self.remove_where(|_| true),
            StopTarget::Label(label) => {
                let key = normalize_label(label);
                self.remove_where(|t| t.key() == key)
            }
        };
        if !removed.is_empty() {
            log::info!("Stopped tracking {} track(s) ({:?})", removed.len(), target);
        }
        removed
    }

    /// Switch mode; tracks no longer of interest are cleared immediately
    pub fn set_profile(&mut self, profile: ModeProfile) -> Vec<TrackId> {
        log::info!("Mode changed: {} -> {} ({})", self.profile.mode, profile.mode, profile.description);
        self.profile = profile;

        let filter = self.profile.label_filter.clone();
        let mut removed = self.remove_where(|t| !filter.accepts(&t.label));

        while self.entries.len() > self.capacity() {
            let Some(index) = self.lowest_confidence_index() else {
                break;
            };
            removed.push(self.entries.remove(index).track.id);
        }
        removed
    }

    fn remove_where(&mut self, predicate: impl Fn(&Track) -> bool) -> Vec<TrackId> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            let remove = predicate(&entry.track);
            if remove {
                removed.push(entry.track.id);
            }
            !remove
        });
        if !removed.is_empty() {
            self.revision += 1;
        }
        removed
    }
}

/// Detection with its box clamped into the frame and its confidence into [0, 1]
fn sanitize(detection: &Detection) -> Option<Detection> {
    if !detection.confidence.is_finite() {
        return None;
    }
    let bbox = detection.bbox.sanitized()?;
    Some(Detection {
        bbox,
        confidence: detection.confidence.clamp(0.0, 1.0),
        ..detection.clone()
    })
}

/// Failure: explicit, low confidence, box out of frame or implausible size jump
fn is_tracker_failure(config: &TrackingConfig, previous: &BBox, update: &TrackerUpdate) -> bool {
    if !update.success || !update.bbox.is_within_frame() || update.bbox.area() <= 0.0 {
        return true;
    }
    if update.confidence.is_some_and(|c| c < config.tracker_confidence_threshold) {
        return true;
    }
    let previous_area = previous.area();
    if previous_area > 0.0 {
        let ratio = update.bbox.area() / previous_area;
        if ratio > config.max_area_change || ratio < 1.0 / config.max_area_change {
            return true;
        }
    }
    false
}

/// Recompute distance, zone, threat and predicted position
fn refresh_derived(entry: &mut TrackEntry, zones: &ProximityZoneEvaluator, horizon: Duration) {
    let track = &mut entry.track;
    track.distance = estimate_distance(&track.bbox, &track.label);
    track.zone = zones.evaluate(track.distance, Some(track.zone));
    track.threat = threat_score(&track.bbox);
    track.predicted_position = predict(track, horizon);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::modes::NavigationMode;

    /// Tracker that keeps its box still and succeeds unless told otherwise
    struct StillTracker {
        bbox: BBox,
    }

    impl LocalTracker for StillTracker {
        fn init(&mut self, bbox: BBox, _frame: &Frame) {
            self.bbox = bbox;
        }

        fn update(&mut self, _frame: &Frame) -> TrackerUpdate {
            TrackerUpdate::ok(self.bbox)
        }
    }

    fn still_factory() -> Box<dyn TrackerFactory> {
        Box::new(|_: &str| Box::new(StillTracker { bbox: BBox::default() }) as Box<dyn LocalTracker>)
    }

    fn track_set() -> TrackSet {
        TrackSet::new(TrackingConfig::default(), ModeProfile::default(), still_factory())
    }

    fn frame(now: Instant) -> Frame {
        Frame::blank(0, 640, 480, now)
    }

    fn detection(label: &str, x: f32, confidence: f32) -> Detection {
        Detection::new(label, BBox::centered_at(Point::new(x, 0.5), 0.1, 0.1), confidence)
    }

    #[test]
    fn test_new_detection_is_acquired() {
        let now = Instant::now();
        let mut set = track_set();
        let report = set.apply_detections(&[detection("phone", 0.5, 0.9)], &frame(now), now);
        assert_eq!(report.created.len(), 1);
        let track = set.get(report.created[0]).unwrap();
        assert_eq!(track.state, TrackState::Acquired);
        assert_eq!(track.confidence, 0.9);
    }

    #[test]
    fn test_acquired_confirmed_by_local_tracker() {
        let now = Instant::now();
        let mut set = track_set();
        let id = set.apply_detections(&[detection("phone", 0.5, 0.9)], &frame(now), now).created[0];
        let later = now + Duration::from_millis(20);
        set.advance(Duration::from_millis(20), &frame(later), later);
        assert_eq!(set.get(id).unwrap().state, TrackState::Tracking);
    }

    #[test]
    fn test_matching_detection_updates_existing() {
        let now = Instant::now();
        let mut set = track_set();
        let id = set.apply_detections(&[detection("Phone", 0.5, 0.6)], &frame(now), now).created[0];
        let report = set.apply_detections(&[detection("phone [on desk]", 0.52, 0.95)], &frame(now), now);
        assert_eq!(report.updated, vec![id]);
        assert!(report.created.is_empty());
        let track = set.get(id).unwrap();
        assert_eq!(track.confidence, 0.95);
        assert_eq!(track.context.as_deref(), Some("on desk"));
        assert_eq!(track.state, TrackState::Tracking);
    }

    #[test]
    fn test_different_label_does_not_match() {
        let now = Instant::now();
        let mut set = track_set();
        set.apply_detections(&[detection("phone", 0.5, 0.6)], &frame(now), now);
        let report = set.apply_detections(&[detection("cup", 0.5, 0.6)], &frame(now), now);
        assert_eq!(report.created.len(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_ids_never_reused() {
        let now = Instant::now();
        let mut set = track_set();
        let first = set.apply_detections(&[detection("phone", 0.5, 0.6)], &frame(now), now).created[0];
        set.stop_tracking(&StopTarget::All);
        let second = set.apply_detections(&[detection("phone", 0.5, 0.6)], &frame(now), now).created[0];
        assert_ne!(first, second);
    }

    #[test]
    fn test_filter_ignores_unrequested_labels() {
        let now = Instant::now();
        let mut set = TrackSet::new(
            TrackingConfig::default(),
            ModeProfile::for_mode(NavigationMode::Social, ""),
            still_factory(),
        );
        let report = set.apply_detections(
            &[detection("person", 0.3, 0.9), detection("door", 0.7, 0.9)],
            &frame(now),
            now,
        );
        assert_eq!(report.ignored, 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_mode_change_clears_uninteresting_tracks() {
        let now = Instant::now();
        let mut set = track_set();
        set.apply_detections(
            &[detection("person", 0.2, 0.9), detection("door", 0.5, 0.9), detection("cup", 0.8, 0.9)],
            &frame(now),
            now,
        );
        let removed = set.set_profile(ModeProfile::for_mode(NavigationMode::Social, ""));
        assert_eq!(removed.len(), 2);
        assert_eq!(set.len(), 1);
        assert_eq!(set.tracks().next().unwrap().label, "person");
    }

    #[test]
    fn test_stop_tracking_label() {
        let now = Instant::now();
        let mut set = track_set();
        set.apply_detections(&[detection("person", 0.2, 0.9), detection("door", 0.7, 0.9)], &frame(now), now);
        let removed = set.stop_tracking(&StopTarget::Label("Door".to_string()));
        assert_eq!(removed.len(), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_lost_confidence_decays() {
        let now = Instant::now();
        let mut set = track_set();
        let id = set.apply_detections(&[detection("phone", 0.5, 0.8)], &frame(now), now).created[0];
        set.entries[0].track.state = TrackState::Lost;
        let later = now + Duration::from_secs(1);
        set.advance(Duration::from_secs(1), &frame(later), later);
        let confidence = set.get(id).unwrap().confidence;
        assert!((confidence - 0.8 * (-0.5f32).exp()).abs() < 1e-5);
    }

    #[test]
    fn test_tracker_drift_is_failure() {
        let config = TrackingConfig::default();
        let previous = BBox::new(0.4, 0.4, 0.1, 0.1);
        assert!(!is_tracker_failure(&config, &previous, &TrackerUpdate::ok(BBox::new(0.41, 0.4, 0.1, 0.1))));
        assert!(is_tracker_failure(&config, &previous, &TrackerUpdate::ok(BBox::new(0.0, 0.0, 0.5, 0.5))));
        assert!(is_tracker_failure(
            &config,
            &previous,
            &TrackerUpdate::ok(previous).with_confidence(0.2)
        ));
        assert!(is_tracker_failure(&config, &previous, &TrackerUpdate::failed(previous)));
    }
}
