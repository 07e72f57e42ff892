// ============================================================================
// Motion Predictor
// ============================================================================
//
// Velocity is an exponentially-weighted moving average over the last K
// position deltas; prediction is a linear extrapolation of the track center.

use crate::geometry::Point;
use crate::track::{Track, Velocity};
use std::collections::VecDeque;
use std::time::Duration;

/// Smoothed velocity estimate over a sliding window of positions
#[derive(Debug, Clone)]
pub struct VelocityEstimator {
    alpha: f32,
    window: usize,
    /// (position, seconds since previous sample)
    samples: VecDeque<(Point, f32)>,
}

impl VelocityEstimator {
    /// # Arguments
    /// * `alpha` - weight of the newest delta, in (0, 1]
    /// * `window` - number of deltas (K) kept
    pub fn new(alpha: f32, window: usize) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            window: window.max(1),
            samples: VecDeque::with_capacity(window.max(1) + 1),
        }
    }

    /// Record a new position observed `dt` after the previous one
    pub fn push(&mut self, position: Point, dt: Duration) {
        let dt = dt.as_secs_f32();
        if dt <= 0.0 {
            // Same instant: keep the newest observation only
            if let Some(last) = self.samples.back_mut() {
                last.0 = position;
                return;
            }
        }
        self.samples.push_back((position, dt));
        while self.samples.len() > self.window + 1 {
            self.samples.pop_front();
        }
    }

    /// Forget history (used when the track jumps to a fresh detection)
    pub fn reset(&mut self, position: Point) {
        self.samples.clear();
        self.samples.push_back((position, 0.0));
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Current smoothed velocity in frame units per second
    pub fn velocity(&self) -> Velocity {
        let mut smoothed: Option<Point> = None;
        for (&(prev, _), &(next, dt)) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            if dt <= 0.0 {
                continue;
            }
            let instant = next.sub(prev).scale(1.0 / dt);
            smoothed = Some(match smoothed {
                None => instant,
                Some(v) => instant.scale(self.alpha).add(v.scale(1.0 - self.alpha)),
            });
        }
        match smoothed {
            Some(v) => Velocity::Known(v),
            None => Velocity::Unset,
        }
    }
}

/// Extrapolate a track's position `horizon` ahead, clamped to the frame
///
/// Without a velocity estimate (fewer than two samples) the current position
/// is returned unchanged.
pub fn predict(track: &Track, horizon: Duration) -> Point {
    extrapolate(track.position(), track.velocity, horizon)
}

/// Linear extrapolation `position + velocity * horizon`
pub fn extrapolate(position: Point, velocity: Velocity, horizon: Duration) -> Point {
    match velocity {
        Velocity::Unset => position,
        Velocity::Known(v) => position.add(v.scale(horizon.as_secs_f32())).clamp_to_frame(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Duration = Duration::from_millis(100);

    #[test]
    fn test_single_sample_has_no_velocity() {
        let mut estimator = VelocityEstimator::new(0.3, 5);
        estimator.push(Point::new(0.5, 0.5), Duration::ZERO);
        assert_eq!(estimator.velocity(), Velocity::Unset);
        assert_eq!(
            extrapolate(Point::new(0.5, 0.5), estimator.velocity(), Duration::from_millis(500)),
            Point::new(0.5, 0.5)
        );
    }

    #[test]
    fn test_constant_velocity_is_exact() {
        let mut estimator = VelocityEstimator::new(0.3, 5);
        for i in 0..8 {
            estimator.push(Point::new(0.2 + 0.01 * i as f32, 0.5), DT);
        }
        let v = estimator.velocity().known().unwrap();
        assert!((v.x - 0.1).abs() < 1e-4, "vx = {}", v.x);
        assert!(v.y.abs() < 1e-6);

        let predicted = extrapolate(Point::new(0.27, 0.5), Velocity::Known(v), Duration::from_millis(500));
        assert!((predicted.x - 0.32).abs() < 1e-4);
    }

    #[test]
    fn test_ewma_damps_jitter() {
        let mut estimator = VelocityEstimator::new(0.3, 5);
        estimator.push(Point::new(0.5, 0.5), Duration::ZERO);
        estimator.push(Point::new(0.5, 0.5), DT);
        estimator.push(Point::new(0.5, 0.5), DT);
        // One sudden 0.05 jump: raw velocity 0.5/s, smoothed 0.3 * 0.5
        estimator.push(Point::new(0.55, 0.5), DT);
        let v = estimator.velocity().known().unwrap();
        assert!((v.x - 0.15).abs() < 1e-4, "vx = {}", v.x);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut estimator = VelocityEstimator::new(0.5, 3);
        for i in 0..20 {
            estimator.push(Point::new(0.01 * i as f32, 0.5), DT);
        }
        assert_eq!(estimator.sample_count(), 4);
    }

    #[test]
    fn test_prediction_clamped_to_frame() {
        let predicted = extrapolate(
            Point::new(0.9, 0.1),
            Velocity::Known(Point::new(1.0, -1.0)),
            Duration::from_secs(1),
        );
        assert_eq!(predicted, Point::new(1.0, 0.0));
    }
}
