//! Spatial audio guidance for navguide
//!
//! Turns the latest `TrackSnapshot` into short stereo cues, one per audible
//! track, and mixes them into a fixed-size quantum:
//! - direction becomes constant-power pan, interaural delay and a high shelf
//! - distance becomes gain and an air-absorption lowpass
//! - proximity zone becomes repetition tempo and a boost
//!
//! The render thread pulls snapshots at the quantum rate and never blocks on
//! the tracking side. Output goes to a cpal device, a WAV file or both.

use std::sync::Once;

// Module declarations
pub mod config;
pub mod cue;
pub mod filters;
pub mod mixer;
pub mod offline;
pub mod oscillator;
pub mod output;
pub mod render;
pub mod signatures;
pub mod spatial;

// Re-exports for easier use
pub use config::{AudioConfig, Settings};
pub use cue::{Cue, CueSynthesizer, focus_gains};
pub use mixer::{MixBuffer, Mixer};
pub use offline::{OfflineReport, render_scene};
pub use output::{AudioSink, DeviceSink, OutputError, PlaybackStats, TeeSink, WavSink, list_output_devices};
pub use render::{RenderCommand, RenderPipeline, RenderStatus, RenderThread};
pub use signatures::{AudioSignature, AudioSignatureTable, Envelope, Waveform};
pub use spatial::SpatialParams;

static INIT: Once = Once::new();

/// Initialize env_logger once; `RUST_LOG` overrides the `info` default
pub fn init_logging() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("navguide v{}", env!("CARGO_PKG_VERSION"));
    });
}
