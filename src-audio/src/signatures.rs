// ============================================================================
// Audio Signatures
// ============================================================================
//
// Static mapping from object type to a synthesis recipe. A signature is a
// short tone burst repeated at `repetition_hz`; zones speed the repetition up.

use navguide_tracking::normalize_label;
use std::collections::HashMap;

/// Oscillator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    /// 25% duty rectangular wave
    Pulse,
    Square,
    Sawtooth,
}

/// Shape of one burst inside a repetition period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    /// Fraction of the period the burst sounds, in (0, 1]
    pub duty: f32,
    pub attack_s: f32,
    pub release_s: f32,
}

impl Envelope {
    pub const fn new(duty: f32, attack_s: f32, release_s: f32) -> Self {
        Self {
            duty,
            attack_s,
            release_s,
        }
    }

    /// Gain in [0, 1] at `phase` in [0, 1) of a period lasting `period_s`
    pub fn gain(&self, phase: f32, period_s: f32) -> f32 {
        let on = self.duty.clamp(0.0, 1.0) * period_s;
        let t = phase * period_s;
        if on <= 0.0 || t >= on {
            return 0.0;
        }
        if self.duty >= 1.0 {
            return 1.0;
        }
        let attack = self.attack_s.min(on / 2.0);
        let release = self.release_s.min(on / 2.0);
        if attack > 0.0 && t < attack {
            t / attack
        } else if release > 0.0 && t > on - release {
            (on - t) / release
        } else {
            1.0
        }
    }
}

/// Synthesis recipe for one object type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSignature {
    pub waveform: Waveform,
    pub frequency_hz: f32,
    /// Bursts per second in the SAFE zone
    pub repetition_hz: f32,
    pub envelope: Envelope,
    /// Peak amplitude of the raw oscillator, at most 1.0
    pub amplitude: f32,
}

impl AudioSignature {
    pub const fn new(waveform: Waveform, frequency_hz: f32, repetition_hz: f32, envelope: Envelope) -> Self {
        Self {
            waveform,
            frequency_hz,
            repetition_hz,
            envelope,
            amplitude: 1.0,
        }
    }
}

const SHORT_BURST: Envelope = Envelope::new(0.3, 0.005, 0.02);
const SOFT_BURST: Envelope = Envelope::new(0.45, 0.02, 0.05);

/// Label -> signature lookup with a default fallback
#[derive(Debug, Clone)]
pub struct AudioSignatureTable {
    signatures: HashMap<String, AudioSignature>,
    fallback: AudioSignature,
}

impl AudioSignatureTable {
    pub fn new(fallback: AudioSignature) -> Self {
        Self {
            signatures: HashMap::new(),
            fallback,
        }
    }

    /// Register (or replace) the signature of a label
    pub fn insert(&mut self, label: &str, signature: AudioSignature) {
        self.signatures.insert(normalize_label(label), signature);
    }

    /// Signature for a detector label; unknown labels get the fallback
    pub fn lookup(&self, label: &str) -> &AudioSignature {
        self.signatures.get(&normalize_label(label)).unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &AudioSignature {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Default for AudioSignatureTable {
    fn default() -> Self {
        let mut table = Self::new(AudioSignature::new(Waveform::Sine, 330.0, 1.0, SOFT_BURST));
        table.insert("person", AudioSignature::new(Waveform::Pulse, 80.0, 1.5, SOFT_BURST));
        table.insert("phone", AudioSignature::new(Waveform::Sine, 440.0, 2.0, SHORT_BURST));
        table.insert("door", AudioSignature::new(Waveform::Sine, 120.0, 0.75, SOFT_BURST));
        table.insert("chair", AudioSignature::new(Waveform::Square, 800.0, 1.5, SHORT_BURST));
        table.insert("table", AudioSignature::new(Waveform::Square, 600.0, 1.0, SHORT_BURST));
        table.insert("cup", AudioSignature::new(Waveform::Sine, 660.0, 2.0, SHORT_BURST));
        table.insert("obstacle", AudioSignature::new(Waveform::Sawtooth, 1000.0, 2.0, SHORT_BURST));
        table
    }
}
