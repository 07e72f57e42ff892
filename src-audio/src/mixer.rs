// ============================================================================
// Mixer
// ============================================================================
//
// Sums cues into one interleaved stereo quantum and runs a single peak
// limiting pass: instant attack, smooth release. The gain applied to a frame
// never exceeds ceiling / peak(frame), so the output never exceeds the
// ceiling no matter how many cues are summed.

use crate::cue::Cue;

/// One rendering quantum of interleaved PCM
#[derive(Debug, Clone, PartialEq)]
pub struct MixBuffer {
    pub channels: usize,
    pub samples: Vec<f32>,
}

impl MixBuffer {
    pub fn silence(frames: usize, channels: usize) -> Self {
        Self {
            channels,
            samples: vec![0.0; frames * channels],
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}

/// Envelope coefficient for a time constant
fn time_to_coeff(time_ms: f32, sample_rate: u32) -> f32 {
    if time_ms <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_ms * 0.001 * sample_rate as f32)).exp()
    }
}

/// Sums cues and keeps the result under full scale
pub struct Mixer {
    frames: usize,
    channels: usize,
    ceiling: f32,
    release_coeff: f32,
    /// Current limiter gain (1.0 = no reduction)
    gain: f32,
    limited_quanta: u64,
}

impl Mixer {
    pub fn new(frames: usize, sample_rate: u32, ceiling: f32, release_ms: f32) -> Self {
        Self {
            frames,
            channels: 2,
            ceiling: ceiling.clamp(f32::EPSILON, 1.0),
            release_coeff: time_to_coeff(release_ms, sample_rate),
            gain: 1.0,
            limited_quanta: 0,
        }
    }

    /// Quanta in which the limiter reduced gain
    pub fn limited_quanta(&self) -> u64 {
        self.limited_quanta
    }

    /// Current limiter gain
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Mix cues in order; no cues yields exact silence
    pub fn mix(&mut self, cues: &[Cue]) -> MixBuffer {
        let mut buffer = MixBuffer::silence(self.frames, self.channels);
        if cues.is_empty() {
            self.gain = 1.0;
            return buffer;
        }

        for cue in cues {
            for (out, &sample) in buffer.samples.iter_mut().zip(&cue.samples) {
                if sample.is_finite() {
                    *out += sample;
                }
            }
        }

        let mut limited = false;
        for frame in buffer.samples.chunks_exact_mut(self.channels) {
            let peak = frame.iter().fold(0.0_f32, |p, s| p.max(s.abs()));
            let target = if peak > self.ceiling { self.ceiling / peak } else { 1.0 };

            if target < self.gain {
                // Instant attack
                self.gain = target;
            } else {
                // Smooth release, never above the target
                self.gain = target - self.release_coeff * (target - self.gain);
            }
            if self.gain < 1.0 {
                limited = true;
            }
            for sample in frame.iter_mut() {
                *sample *= self.gain;
            }
        }

        if limited {
            self.limited_quanta += 1;
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navguide_tracking::TrackId;

    fn full_scale_cue(id: u64, frames: usize) -> Cue {
        let samples = (0..frames * 2)
            .map(|i| if (i / 2) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        Cue {
            track_id: TrackId(id),
            samples,
        }
    }

    #[test]
    fn test_no_cues_is_exact_silence() {
        let mut mixer = Mixer::new(256, 48000, 0.98, 200.0);
        let buffer = mixer.mix(&[]);
        assert_eq!(buffer.frames(), 256);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_silent_cues_stay_silent() {
        let mut mixer = Mixer::new(256, 48000, 0.98, 200.0);
        let cue = Cue {
            track_id: TrackId(1),
            samples: vec![0.0; 512],
        };
        assert!(mixer.mix(&[cue.clone(), cue]).is_silent());
    }

    #[test]
    fn test_quiet_mix_passes_unchanged() {
        let mut mixer = Mixer::new(4, 48000, 0.98, 200.0);
        let cue = Cue {
            track_id: TrackId(1),
            samples: vec![0.25, -0.25, 0.1, 0.0, 0.0, 0.3, -0.2, 0.2],
        };
        let buffer = mixer.mix(std::slice::from_ref(&cue));
        assert_eq!(buffer.samples, cue.samples);
        assert_eq!(mixer.limited_quanta(), 0);
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        for count in [1, 3, 5] {
            let mut mixer = Mixer::new(512, 48000, 0.98, 200.0);
            let cues: Vec<Cue> = (0..count).map(|i| full_scale_cue(i, 512)).collect();
            for _ in 0..4 {
                let buffer = mixer.mix(&cues);
                assert!(buffer.peak() <= 0.98 + 1e-6, "{} cues peaked at {}", count, buffer.peak());
            }
        }
    }

    #[test]
    fn test_gain_recovers_after_burst() {
        let mut mixer = Mixer::new(4800, 48000, 0.98, 20.0);
        mixer.mix(&[full_scale_cue(1, 4800), full_scale_cue(2, 4800)]);
        assert!(mixer.gain() < 0.5);

        let quiet = Cue {
            track_id: TrackId(1),
            samples: vec![0.1; 9600],
        };
        mixer.mix(&[quiet]);
        assert!(mixer.gain() > 0.99);
    }
}
