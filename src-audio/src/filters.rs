// ============================================================================
// Biquad Filters
// ============================================================================
//
// RBJ cookbook biquads used per voice: a lowpass for air absorption and a
// high shelf for elevation brightness. Coefficients can be retuned every
// quantum without resetting the filter state.

use std::f32::consts::PI;

/// Q of a second-order Butterworth section
pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadFilterType {
    Lowpass,
    Highshelf,
}

#[derive(Debug, Clone)]
pub struct Biquad {
    pub filter_type: BiquadFilterType,
    pub freq: f32,
    pub srate: f32,
    pub q: f32,
    pub db_gain: f32,
    a1: f32,
    a2: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn new(filter_type: BiquadFilterType, freq: f32, srate: f32, q: f32, db_gain: f32) -> Self {
        let mut biquad = Biquad {
            filter_type,
            freq,
            srate,
            q: if q > 0.0 { q } else { BUTTERWORTH_Q },
            db_gain,
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        biquad.compute_coeffs();
        biquad
    }

    pub fn lowpass(freq: f32, srate: f32) -> Self {
        Self::new(BiquadFilterType::Lowpass, freq, srate, BUTTERWORTH_Q, 0.0)
    }

    pub fn highshelf(freq: f32, srate: f32, db_gain: f32) -> Self {
        Self::new(BiquadFilterType::Highshelf, freq, srate, BUTTERWORTH_Q, db_gain)
    }

    /// Retune; the delay line is kept so the change is click-free
    pub fn set(&mut self, freq: f32, db_gain: f32) {
        if (freq - self.freq).abs() < 1e-3 && (db_gain - self.db_gain).abs() < 1e-4 {
            return;
        }
        self.freq = freq;
        self.db_gain = db_gain;
        self.compute_coeffs();
    }

    fn compute_coeffs(&mut self) {
        let freq = self.freq.clamp(10.0, self.srate * 0.49);
        let a = 10.0_f32.powf(self.db_gain / 40.0);
        let omega = 2.0 * PI * freq / self.srate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * self.q);
        let beta = (a + a).sqrt();

        let (b0, b1, b2, a0, a1, a2);
        match self.filter_type {
            BiquadFilterType::Lowpass => {
                b0 = (1.0 - cs) / 2.0;
                b1 = 1.0 - cs;
                b2 = (1.0 - cs) / 2.0;
                a0 = 1.0 + alpha;
                a1 = -2.0 * cs;
                a2 = 1.0 - alpha;
            }
            BiquadFilterType::Highshelf => {
                b0 = a * ((a + 1.0) + (a - 1.0) * cs + beta * sn);
                b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cs);
                b2 = a * ((a + 1.0) + (a - 1.0) * cs - beta * sn);
                a0 = (a + 1.0) - (a - 1.0) * cs + beta * sn;
                a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cs);
                a2 = (a + 1.0) - (a - 1.0) * cs - beta * sn;
            }
        }

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}
