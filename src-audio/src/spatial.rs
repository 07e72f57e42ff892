// ============================================================================
// Spatialization
// ============================================================================
//
// Maps a track's predicted position, distance and zone to rendering
// parameters. Everything here is a pure function of one track snapshot.

use crate::config::AudioConfig;
use navguide_tracking::distance::{MAX_DISTANCE_M, MIN_DISTANCE_M};
use navguide_tracking::{Point, Track, Zone};

/// Per-track rendering parameters for one quantum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
    pub left_gain: f32,
    pub right_gain: f32,
    /// Interaural delay (s); positive delays the left ear
    pub itd_s: f32,
    /// High-shelf gain for elevation (dB)
    pub shelf_db: f32,
    pub distance_gain: f32,
    pub cutoff_hz: f32,
    /// Repetition-rate multiplier for the zone
    pub tempo: f32,
    /// Zone gain boost, independent of distance
    pub boost: f32,
}

impl SpatialParams {
    pub fn for_track(track: &Track, config: &AudioConfig) -> Self {
        let position = track.predicted_position;
        let azimuth_deg = azimuth(position, config.max_azimuth_deg);
        let elevation_deg = elevation(position, config.max_elevation_deg);
        let (left_gain, right_gain) = constant_power_pan(azimuth_deg, config.max_azimuth_deg);
        let (tempo, boost) = zone_modulation(track.zone, config);

        Self {
            azimuth_deg,
            elevation_deg,
            left_gain,
            right_gain,
            itd_s: interaural_delay(azimuth_deg, config.max_azimuth_deg, config.max_itd_ms),
            shelf_db: brightness_db(elevation_deg, config.max_elevation_deg, config.brightness_db),
            distance_gain: distance_gain(track.distance, config),
            cutoff_hz: absorption_cutoff(track.distance, config),
            tempo,
            boost,
        }
    }
}

/// Horizontal angle: 0 at frame center, +max at the right edge
pub fn azimuth(position: Point, max_azimuth_deg: f32) -> f32 {
    (position.x.clamp(0.0, 1.0) - 0.5) * 2.0 * max_azimuth_deg
}

/// Vertical angle: positive above frame center (y grows downwards)
pub fn elevation(position: Point, max_elevation_deg: f32) -> f32 {
    (0.5 - position.y.clamp(0.0, 1.0)) * 2.0 * max_elevation_deg
}

/// Constant-power pan: the azimuth range maps onto a quarter circle, so
/// left^2 + right^2 == 1 everywhere and both gains are equal at 0
pub fn constant_power_pan(azimuth_deg: f32, max_azimuth_deg: f32) -> (f32, f32) {
    let scale = 45.0 / max_azimuth_deg;
    let angle = (azimuth_deg.clamp(-max_azimuth_deg, max_azimuth_deg) * scale + 45.0).to_radians();
    (angle.cos(), angle.sin())
}

/// Simulated interaural delay, proportional to azimuth
pub fn interaural_delay(azimuth_deg: f32, max_azimuth_deg: f32, max_itd_ms: f32) -> f32 {
    (azimuth_deg / max_azimuth_deg).clamp(-1.0, 1.0) * max_itd_ms / 1000.0
}

/// Shelf gain: boost above center, roll-off below
pub fn brightness_db(elevation_deg: f32, max_elevation_deg: f32, brightness_db: f32) -> f32 {
    (elevation_deg / max_elevation_deg).clamp(-1.0, 1.0) * brightness_db
}

/// Inverse-distance attenuation, floored so far objects stay audible
pub fn distance_gain(distance: f32, config: &AudioConfig) -> f32 {
    let d = distance.max(f32::EPSILON);
    (config.reference_distance / (config.rolloff * d)).clamp(config.min_distance_gain, 1.0)
}

/// Lowpass cutoff falling log-linearly from near to far
pub fn absorption_cutoff(distance: f32, config: &AudioConfig) -> f32 {
    let t = ((distance - MIN_DISTANCE_M) / (MAX_DISTANCE_M - MIN_DISTANCE_M)).clamp(0.0, 1.0);
    config.max_cutoff_hz * (config.min_cutoff_hz / config.max_cutoff_hz).powf(t)
}

/// (tempo multiplier, gain boost) for a zone
pub fn zone_modulation(zone: Zone, config: &AudioConfig) -> (f32, f32) {
    match zone {
        Zone::Safe => (1.0, 1.0),
        Zone::Caution => (config.caution_tempo, 1.0),
        Zone::Warning => (config.warning_tempo, config.warning_boost),
    }
}
