// ============================================================================
// Tracking Configuration
// ============================================================================
//
// All durations are expressed in seconds in configuration files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Longest accepted duration field (one year); use it for "never"
pub const MAX_DURATION_S: f64 = 365.0 * 24.0 * 3600.0;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Distance boundaries (meters) between proximity zones
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneThresholds {
    /// Below this distance an object is at least CAUTION
    pub caution_m: f32,
    /// Below this distance an object is WARNING
    pub warning_m: f32,
    /// Distance a boundary must be crossed by before the zone changes
    pub hysteresis_m: f32,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            caution_m: 2.0,
            warning_m: 1.0,
            hysteresis_m: 0.1,
        }
    }
}

/// TrackSet, predictor and re-acquisition tunables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Maximum number of live tracks
    pub max_tracks: usize,
    /// Prediction horizon (s)
    pub predict_horizon: f64,
    /// Unconfirmed tracks expire this long after their last detection (s)
    pub expire_after: f64,
    /// Tracking tracks expire when no detection confirmed them for this long (s)
    pub max_unverified: f64,
    /// Minimum delay between two re-acquisition requests for one track (s)
    pub reacquire_cooldown: f64,
    /// Detector attempts per re-acquisition request
    pub max_attempts: u32,
    /// Backoff before the first retry, doubled on each retry (s)
    pub retry_backoff: f64,
    /// Per-attempt detector timeout (s)
    pub request_timeout: f64,
    /// Full-frame scan period (s), 0 disables
    pub scan_interval: f64,
    /// EWMA weight of the newest velocity sample
    pub velocity_alpha: f32,
    /// Number of position deltas considered by the velocity estimate
    pub velocity_window: usize,
    /// Confidence decay rate while lost (1/s)
    pub confidence_decay: f32,
    /// Local tracker updates below this confidence count as failures
    pub tracker_confidence_threshold: f32,
    /// Area ratio between consecutive tracker boxes that counts as drift
    pub max_area_change: f32,
    /// Minimum IoU for a detection to match a track
    pub match_iou: f32,
    /// Maximum center distance for a detection to match a track
    pub match_center_distance: f32,
    /// IoU above which a tracking track adopts the detection's box
    pub adopt_iou: f32,
    pub zones: ZoneThresholds,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_tracks: 5,
            predict_horizon: 0.5,
            expire_after: 5.0,
            max_unverified: 30.0,
            reacquire_cooldown: 1.0,
            max_attempts: 3,
            retry_backoff: 0.2,
            request_timeout: 3.0,
            scan_interval: 2.0,
            velocity_alpha: 0.3,
            velocity_window: 5,
            confidence_decay: 0.5,
            tracker_confidence_threshold: 0.5,
            max_area_change: 3.0,
            match_iou: 0.1,
            match_center_distance: 0.1,
            adopt_iou: 0.6,
            zones: ZoneThresholds::default(),
        }
    }
}

impl TrackingConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text and validate it
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: TrackingConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tracks == 0 {
            return Err(invalid("max_tracks", "must be at least 1"));
        }
        if !(self.velocity_alpha > 0.0 && self.velocity_alpha <= 1.0) {
            return Err(invalid("velocity_alpha", "must be in (0, 1]"));
        }
        if self.velocity_window == 0 {
            return Err(invalid("velocity_window", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        for (field, value) in [
            ("predict_horizon", self.predict_horizon),
            ("expire_after", self.expire_after),
            ("max_unverified", self.max_unverified),
            ("reacquire_cooldown", self.reacquire_cooldown),
            ("retry_backoff", self.retry_backoff),
            ("scan_interval", self.scan_interval),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("must be a non-negative duration, got {}", value)));
            }
            if value > MAX_DURATION_S {
                return Err(invalid(field, format!("must be at most {} s, got {}", MAX_DURATION_S, value)));
            }
        }
        if !(self.request_timeout.is_finite() && self.request_timeout > 0.0) {
            return Err(invalid("request_timeout", "must be positive"));
        }
        if self.request_timeout > MAX_DURATION_S {
            return Err(invalid("request_timeout", format!("must be at most {} s", MAX_DURATION_S)));
        }
        let zones = &self.zones;
        if !(zones.warning_m > 0.0 && zones.warning_m < zones.caution_m) {
            return Err(invalid("zones", "expected 0 < warning_m < caution_m"));
        }
        if zones.hysteresis_m < 0.0 || zones.hysteresis_m * 2.0 >= zones.caution_m - zones.warning_m {
            return Err(invalid(
                "zones.hysteresis_m",
                "must be non-negative and smaller than half the CAUTION band",
            ));
        }
        Ok(())
    }

    pub fn predict_horizon(&self) -> Duration {
        seconds(self.predict_horizon)
    }

    pub fn expire_after(&self) -> Duration {
        seconds(self.expire_after)
    }

    pub fn max_unverified(&self) -> Duration {
        seconds(self.max_unverified)
    }

    pub fn reacquire_cooldown(&self) -> Duration {
        seconds(self.reacquire_cooldown)
    }

    pub fn retry_backoff(&self) -> Duration {
        seconds(self.retry_backoff)
    }

    pub fn request_timeout(&self) -> Duration {
        seconds(self.request_timeout)
    }

    /// Periodic scan interval, `None` when disabled
    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval > 0.0).then(|| seconds(self.scan_interval))
    }
}

/// Seconds to `Duration`, saturating instead of panicking on fields
/// changed after validation
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}
