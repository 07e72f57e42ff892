// ============================================================================
// Distance and Threat Heuristics
// ============================================================================
//
// Range is inferred from apparent size: an object filling half the frame is
// about one meter away, scaled by a per-label physical size prior.

use crate::geometry::BBox;
use crate::track::normalize_label;

/// Fraction of the frame an object of prior 1.0 covers at one meter
pub const REFERENCE_AREA: f32 = 0.5;
pub const MIN_DISTANCE_M: f32 = 0.5;
pub const MAX_DISTANCE_M: f32 = 10.0;

/// Relative physical size of common labels
fn size_prior(label_key: &str) -> f32 {
    match label_key {
        "person" => 1.6,
        "door" => 1.8,
        "car" | "truck" | "bus" => 3.0,
        "chair" => 1.0,
        "table" | "couch" => 1.2,
        "phone" | "cup" | "pen" => 0.3,
        "bottle" => 0.35,
        "laptop" | "book" => 0.5,
        _ => 1.0,
    }
}

/// Estimated range in meters for a bounding box of the given label
pub fn estimate_distance(bbox: &BBox, label: &str) -> f32 {
    let area = bbox.area().max(1e-6);
    let prior = size_prior(&normalize_label(label));
    (prior * (REFERENCE_AREA / area).sqrt()).clamp(MIN_DISTANCE_M, MAX_DISTANCE_M)
}

/// Threat score in [0, 1]: 70% apparent size, 30% centrality
pub fn threat_score(bbox: &BBox) -> f32 {
    let size_score = (bbox.area() / REFERENCE_AREA).min(1.0);
    let offset = (bbox.center().x - 0.5).abs() / 0.5;
    let centrality = 1.0 - offset.min(1.0);
    size_score * 0.7 + centrality * 0.3
}
