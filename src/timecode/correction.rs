// ABOUTME: Intra-second output timing correction curve
// ABOUTME: Maps the fractional-second position to a lead in frames for the paced audio path

use std::f64::consts::PI;

/// Correction applied to the paced timecode, in frames.
///
/// The device emits the start of each second later than the end of it, so the
/// lead is largest just after the second boundary and decays toward
/// `min_frames` as the second progresses. The constants were tuned against one
/// device/driver pair; treat them as policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionCurve {
    /// Lead at the end of the second.
    pub min_frames: f64,
    /// Lead at the start of the second.
    pub max_frames: f64,
    /// Exponential decay rate from max toward min.
    pub decay_rate: f64,
    /// Amplitude of the one-cycle-per-second sine term.
    pub phase_amplitude: f64,
    /// Amplitude of the `1 - x^2` term.
    pub quadratic_amplitude: f64,
}

impl CorrectionCurve {
    /// Curve with the tuned defaults.
    pub fn new() -> Self {
        Self {
            min_frames: 1.0,
            max_frames: 3.0,
            decay_rate: 3.0,
            phase_amplitude: 0.2,
            quadratic_amplitude: 0.3,
        }
    }

    /// Curve that applies no correction.
    pub fn disabled() -> Self {
        Self {
            min_frames: 0.0,
            max_frames: 0.0,
            decay_rate: 0.0,
            phase_amplitude: 0.0,
            quadratic_amplitude: 0.0,
        }
    }

    /// Lead in frames at `second_fraction` (clamped to `[0, 1)`).
    pub fn offset_frames(&self, second_fraction: f64) -> f64 {
        let x = second_fraction.clamp(0.0, 1.0);
        let normalized = 1.0 - (-self.decay_rate * x).exp();
        let mut frames = self.max_frames - normalized * (self.max_frames - self.min_frames);
        frames += self.phase_amplitude * (2.0 * PI * x).sin();
        frames += self.quadratic_amplitude * (1.0 - x * x);
        frames
    }

    /// Lead in whole microseconds for a frame of `frame_duration_us`.
    pub fn offset_us(&self, second_fraction: f64, frame_duration_us: i64) -> i64 {
        (frame_duration_us as f64 * self.offset_frames(second_fraction)) as i64
    }
}

impl Default for CorrectionCurve {
    fn default() -> Self {
        Self::new()
    }
}
