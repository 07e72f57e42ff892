// ============================================================================
// Audio Configuration
// ============================================================================

use navguide_tracking::{ConfigError, TrackingConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Rendering, spatialization and output parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames per rendering quantum
    pub quantum_frames: usize,
    pub channels: u16,
    /// Substring of the output device name, default device when unset
    pub output_device: Option<String>,
    /// Capacity of the render -> output queue, in quanta
    pub queue_quanta: usize,

    // Spatialization
    /// Azimuth at the frame edge (deg)
    pub max_azimuth_deg: f32,
    /// Elevation at the top/bottom frame edge (deg)
    pub max_elevation_deg: f32,
    /// Interaural delay at the maximum azimuth (ms)
    pub max_itd_ms: f32,
    /// High-shelf gain at the maximum elevation (dB)
    pub brightness_db: f32,

    // Distance
    pub reference_distance: f32,
    pub rolloff: f32,
    /// Distant objects never go quieter than this
    pub min_distance_gain: f32,
    /// Air-absorption lowpass cutoff at the nearest distance (Hz)
    pub max_cutoff_hz: f32,
    /// Air-absorption lowpass cutoff at the farthest distance (Hz)
    pub min_cutoff_hz: f32,

    // Zones
    /// Repetition-rate multiplier in CAUTION
    pub caution_tempo: f32,
    /// Repetition-rate multiplier in WARNING
    pub warning_tempo: f32,
    /// Fixed gain applied in WARNING, on top of distance attenuation
    pub warning_boost: f32,
    /// Gain of tracks outside the audio focus
    pub duck_gain: f32,

    // Mixer
    /// Output peak ceiling (linear, full scale = 1.0)
    pub ceiling: f32,
    pub limiter_release_ms: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            quantum_frames: 1024,
            channels: 2,
            output_device: None,
            queue_quanta: 4,
            max_azimuth_deg: 80.0,
            max_elevation_deg: 60.0,
            max_itd_ms: 0.66,
            brightness_db: 6.0,
            reference_distance: 1.0,
            rolloff: 0.5,
            min_distance_gain: 0.1,
            max_cutoff_hz: 16000.0,
            min_cutoff_hz: 900.0,
            caution_tempo: 2.0,
            warning_tempo: 4.0,
            warning_boost: 1.5,
            duck_gain: 0.3,
            ceiling: 0.98,
            limiter_release_ms: 200.0,
        }
    }
}

impl AudioConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AudioConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(invalid("sample_rate", format!("{} Hz is out of range", self.sample_rate)));
        }
        if self.quantum_frames < 64 {
            return Err(invalid("quantum_frames", "must be at least 64"));
        }
        if self.channels != 2 {
            return Err(invalid("channels", "only stereo output is supported"));
        }
        if self.queue_quanta == 0 {
            return Err(invalid("queue_quanta", "must be at least 1"));
        }
        if !(self.max_azimuth_deg > 0.0 && self.max_azimuth_deg <= 90.0) {
            return Err(invalid("max_azimuth_deg", "must be in (0, 90]"));
        }
        if !(self.max_elevation_deg > 0.0 && self.max_elevation_deg <= 90.0) {
            return Err(invalid("max_elevation_deg", "must be in (0, 90]"));
        }
        if self.max_itd_ms < 0.0 || self.max_itd_ms > 2.0 {
            return Err(invalid("max_itd_ms", "must be in [0, 2]"));
        }
        if !(self.reference_distance > 0.0 && self.rolloff > 0.0) {
            return Err(invalid("rolloff", "reference_distance and rolloff must be positive"));
        }
        if !(self.min_distance_gain > 0.0 && self.min_distance_gain <= 1.0) {
            return Err(invalid("min_distance_gain", "must be in (0, 1]"));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.min_cutoff_hz > 20.0 && self.min_cutoff_hz <= self.max_cutoff_hz && self.max_cutoff_hz < nyquist) {
            return Err(invalid(
                "max_cutoff_hz",
                "expected 20 < min_cutoff_hz <= max_cutoff_hz < sample_rate / 2",
            ));
        }
        if !(self.caution_tempo >= 1.0 && self.warning_tempo >= self.caution_tempo) {
            return Err(invalid("warning_tempo", "expected 1 <= caution_tempo <= warning_tempo"));
        }
        if self.warning_boost < 1.0 {
            return Err(invalid("warning_boost", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.duck_gain) {
            return Err(invalid("duck_gain", "must be in [0, 1]"));
        }
        if !(self.ceiling > 0.0 && self.ceiling <= 1.0) {
            return Err(invalid("ceiling", "must be in (0, 1]"));
        }
        if self.limiter_release_ms < 0.0 {
            return Err(invalid("limiter_release_ms", "must be non-negative"));
        }
        Ok(())
    }

    /// Duration of one rendering quantum
    pub fn quantum(&self) -> Duration {
        Duration::from_secs_f64(self.quantum_frames as f64 / self.sample_rate as f64)
    }
}

/// Combined configuration file: `tracking:` and `audio:` sections
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracking: TrackingConfig,
    pub audio: AudioConfig,
}

impl Settings {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(contents)?;
        settings.tracking.validate()?;
        settings.audio.validate()?;
        Ok(settings)
    }
}
