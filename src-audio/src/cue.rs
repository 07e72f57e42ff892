// ============================================================================
// Cue Synthesizer
// ============================================================================
//
// Renders one stereo block per audible track per quantum. Voices carry
// oscillator, filter and delay state across quanta; every parameter is
// ramped linearly across the quantum so position and zone changes never
// click. New voices fade in over one quantum, vanished ones fade out over
// one quantum and are dropped.

use crate::config::AudioConfig;
use crate::filters::Biquad;
use crate::oscillator::{Oscillator, Phase};
use crate::signatures::{AudioSignature, AudioSignatureTable};
use crate::spatial::SpatialParams;
use navguide_tracking::{AudioFocus, Track, TrackId, TrackSnapshot, Zone};

/// Corner frequency of the elevation shelf
const SHELF_FREQ_HZ: f32 = 4000.0;

/// Threat below this fraction of the highest threat is ducked in `All` focus
const FOCUS_THREAT_RATIO: f32 = 0.8;

/// One track's rendered block for the current quantum
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub track_id: TrackId,
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
}

impl Cue {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}

/// Values a voice ramps between across one quantum
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoiceTarget {
    left: f32,
    right: f32,
    itd_samples: f32,
    gain: f32,
    tempo: f32,
    shelf_db: f32,
    cutoff_hz: f32,
}

impl VoiceTarget {
    fn new(params: &SpatialParams, focus_gain: f32, signature: &AudioSignature, sample_rate: f32) -> Self {
        Self {
            left: params.left_gain,
            right: params.right_gain,
            itd_samples: params.itd_s * sample_rate,
            gain: params.distance_gain * params.boost * focus_gain * signature.amplitude,
            tempo: params.tempo,
            shelf_db: params.shelf_db,
            cutoff_hz: params.cutoff_hz,
        }
    }
}

/// Short fractional delay line for the interaural delay
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    fn new(max_delay_samples: f32) -> Self {
        let len = max_delay_samples.ceil().max(0.0) as usize + 2;
        Self {
            buffer: vec![0.0; len],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buffer[self.write] = sample;
        self.write = (self.write + 1) % self.buffer.len();
    }

    /// Sample `delay` samples behind the newest one, linearly interpolated
    fn read(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(0.0, (len - 2) as f32);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let newest = (self.write + len - 1) % len;
        let a = self.buffer[(newest + len - whole) % len];
        let b = self.buffer[(newest + len - whole - 1) % len];
        a + (b - a) * frac
    }
}

/// Synthesis state of one track
struct Voice {
    track_id: TrackId,
    signature: AudioSignature,
    oscillator: Oscillator,
    repetition: Phase,
    shelf: Biquad,
    lowpass: Biquad,
    delay: DelayLine,
    last: Option<VoiceTarget>,
}

impl Voice {
    fn new(track_id: TrackId, signature: AudioSignature, config: &AudioConfig) -> Self {
        let sample_rate = config.sample_rate as f32;
        Self {
            track_id,
            signature,
            oscillator: Oscillator::new(),
            repetition: Phase::default(),
            shelf: Biquad::highshelf(SHELF_FREQ_HZ, sample_rate, 0.0),
            lowpass: Biquad::lowpass(config.max_cutoff_hz, sample_rate),
            delay: DelayLine::new(config.max_itd_ms / 1000.0 * sample_rate),
            last: None,
        }
    }

    /// Render one quantum ramping from the previous target to `target`,
    /// with the overall fade going from `fade.0` to `fade.1`
    fn render(&mut self, target: VoiceTarget, fade: (f32, f32), frames: usize, sample_rate: f32) -> Vec<f32> {
        let from = self.last.unwrap_or(target);
        self.shelf.set(SHELF_FREQ_HZ, target.shelf_db);
        self.lowpass.set(target.cutoff_hz, 0.0);

        let signature = self.signature;
        let mut samples = vec![0.0; frames * 2];
        for (n, frame) in samples.chunks_exact_mut(2).enumerate() {
            let t = (n + 1) as f32 / frames as f32;
            let lerp = |a: f32, b: f32| a + (b - a) * t;

            let repetition_hz = (signature.repetition_hz * lerp(from.tempo, target.tempo)).max(f32::EPSILON);
            let envelope = signature.envelope.gain(self.repetition.value(), 1.0 / repetition_hz);
            self.repetition.advance(repetition_hz, sample_rate);

            let raw = self.oscillator.next_sample(signature.waveform, signature.frequency_hz, sample_rate) * envelope;
            let filtered = self.lowpass.process(self.shelf.process(raw));
            self.delay.push(filtered);

            let itd = lerp(from.itd_samples, target.itd_samples);
            let (left_delay, right_delay) = if itd >= 0.0 { (itd, 0.0) } else { (0.0, -itd) };
            let gain = lerp(from.gain, target.gain) * lerp(fade.0, fade.1);

            frame[0] = self.delay.read(left_delay) * lerp(from.left, target.left) * gain;
            frame[1] = self.delay.read(right_delay) * lerp(from.right, target.right) * gain;
        }

        self.last = Some(target);
        samples
    }
}

/// Turns track snapshots into per-track stereo cues
pub struct CueSynthesizer {
    config: AudioConfig,
    table: AudioSignatureTable,
    voices: Vec<Voice>,
}

impl CueSynthesizer {
    pub fn new(config: AudioConfig, table: AudioSignatureTable) -> Self {
        Self {
            config,
            table,
            voices: Vec::new(),
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Number of voices still holding state
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Render every audible track of `snapshot`, plus the final fade-out of
    /// voices whose track disappeared or went silent
    pub fn render(&mut self, snapshot: &TrackSnapshot) -> Vec<Cue> {
        let frames = self.config.quantum_frames;
        let sample_rate = self.config.sample_rate as f32;

        let audible: Vec<&Track> = snapshot.iter().filter(|t| t.state.is_audible()).collect();
        let gains = focus_gains(&audible, &snapshot.focus, self.config.duck_gain);

        let mut cues = Vec::with_capacity(audible.len() + self.voices.len());
        let mut live: Vec<TrackId> = Vec::with_capacity(audible.len());

        for (track, focus_gain) in audible.iter().zip(gains) {
            let index = match self.voices.iter().position(|v| v.track_id == track.id) {
                Some(index) => index,
                None => {
                    log::debug!("New voice for track {} ({})", track.id, track.label);
                    let signature = *self.table.lookup(&track.label);
                    self.voices.push(Voice::new(track.id, signature, &self.config));
                    self.voices.len() - 1
                }
            };
            let voice = &mut self.voices[index];
            let params = SpatialParams::for_track(track, &self.config);
            let target = VoiceTarget::new(&params, focus_gain, &voice.signature, sample_rate);
            let fade = if voice.last.is_none() { (0.0, 1.0) } else { (1.0, 1.0) };

            cues.push(Cue {
                track_id: track.id,
                samples: voice.render(target, fade, frames, sample_rate),
            });
            live.push(track.id);
        }

        for voice in self.voices.iter_mut().filter(|v| !live.contains(&v.track_id)) {
            if let Some(target) = voice.last {
                cues.push(Cue {
                    track_id: voice.track_id,
                    samples: voice.render(target, (1.0, 0.0), frames, sample_rate),
                });
            }
        }
        self.voices.retain(|v| live.contains(&v.track_id));

        cues
    }
}

/// Focus gain per audible track: 1.0 in focus, `duck_gain` otherwise.
/// WARNING tracks are never ducked.
pub fn focus_gains(tracks: &[&Track], focus: &AudioFocus, duck_gain: f32) -> Vec<f32> {
    let in_focus: Vec<bool> = match focus {
        AudioFocus::All => {
            let max_threat = tracks.iter().fold(0.0_f32, |m, t| m.max(t.threat));
            tracks
                .iter()
                .map(|t| t.threat >= FOCUS_THREAT_RATIO * max_threat)
                .collect()
        }
        AudioFocus::Closest => {
            let closest = tracks
                .iter()
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
                .map(|t| t.id);
            tracks.iter().map(|t| Some(t.id) == closest).collect()
        }
        AudioFocus::Target(label) => tracks.iter().map(|t| &t.key() == label).collect(),
        AudioFocus::People => tracks.iter().map(|t| t.key() == "person").collect(),
    };

    tracks
        .iter()
        .zip(in_focus)
        .map(|(track, focused)| {
            if focused || track.zone == Zone::Warning {
                1.0
            } else {
                duck_gain
            }
        })
        .collect()
}
