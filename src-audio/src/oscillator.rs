// ============================================================================
// Oscillators
// ============================================================================

use crate::signatures::Waveform;
use std::f32::consts::TAU;

const PULSE_DUTY: f32 = 0.25;

/// Phase accumulator in [0, 1)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Phase(f32);

impl Phase {
    pub fn value(&self) -> f32 {
        self.0
    }

    /// Advance by `frequency / sample_rate`; returns true on wrap-around
    pub fn advance(&mut self, frequency_hz: f32, sample_rate: f32) -> bool {
        self.0 += frequency_hz / sample_rate;
        if self.0 >= 1.0 {
            self.0 = self.0.fract();
            true
        } else {
            false
        }
    }
}

/// Naive (non band-limited) oscillator
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    phase: Phase,
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sample in [-1, 1]
    pub fn next_sample(&mut self, waveform: Waveform, frequency_hz: f32, sample_rate: f32) -> f32 {
        let sample = shape(waveform, self.phase.value());
        self.phase.advance(frequency_hz, sample_rate);
        sample
    }
}

/// Waveform value at `phase` in [0, 1)
pub fn shape(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Pulse => {
            if phase < PULSE_DUTY {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * phase - 1.0,
    }
}
