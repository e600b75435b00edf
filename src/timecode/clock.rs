// ABOUTME: Timecode clock engine
// ABOUTME: Converts wall-clock microseconds plus device delay and sync offset into frame-accurate timecode

use crate::timecode::{CivilZone, CorrectionCurve, FrameRateSpec, Timecode};
use crate::{MICROS_PER_SECOND, SAMPLE_RATE};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock reading in integer microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallClockSample {
    unix_micros: i64,
}

impl WallClockSample {
    /// Read the system realtime clock.
    pub fn now() -> Self {
        let unix_micros = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_micros() as i64,
            Err(before) => -(before.duration().as_micros() as i64),
        };
        Self { unix_micros }
    }

    /// Sample at an explicit Unix time.
    pub fn from_unix_micros(unix_micros: i64) -> Self {
        Self { unix_micros }
    }

    pub fn unix_micros(&self) -> i64 {
        self.unix_micros
    }

    /// Position within the current second, `[0, 1)`.
    pub fn second_fraction(&self) -> f64 {
        self.unix_micros.rem_euclid(MICROS_PER_SECOND) as f64 / MICROS_PER_SECOND as f64
    }
}

/// Convert an output delay in sample frames to microseconds, rounding to nearest.
pub fn delay_frames_to_us(delay_frames: u64, sample_rate: u32) -> i64 {
    let rate = sample_rate.max(1) as i64;
    let frames = delay_frames.min(i64::MAX as u64 / MICROS_PER_SECOND as u64) as i64;
    (frames * MICROS_PER_SECOND + rate / 2) / rate
}

/// Pure timecode computation for one frame rate.
///
/// Holds no mutable state: the sync offset is passed in by the caller, which
/// reads it from [`crate::sync::ClockOffset`] and releases the lock before
/// calling here.
#[derive(Debug, Clone)]
pub struct TimecodeClock {
    rate: &'static FrameRateSpec,
    sample_rate: u32,
    curve: CorrectionCurve,
    zone: CivilZone,
}

impl TimecodeClock {
    /// Engine at the fixed output sample rate with the default correction curve
    /// and local time.
    pub fn new(rate: &'static FrameRateSpec) -> Self {
        Self {
            rate,
            sample_rate: SAMPLE_RATE,
            curve: CorrectionCurve::default(),
            zone: CivilZone::Local,
        }
    }

    /// Replace the intra-second correction curve.
    pub fn with_curve(mut self, curve: CorrectionCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Replace the civil time zone.
    pub fn with_zone(mut self, zone: CivilZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn rate(&self) -> &'static FrameRateSpec {
        self.rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn zone(&self) -> CivilZone {
        self.zone
    }

    /// Timecode for audio about to be written to the sink.
    ///
    /// `device_delay_frames` is how many sample frames sit between the write
    /// and the speaker; `None` (delay unknown) is treated as zero.
    pub fn compute_paced(
        &self,
        now: WallClockSample,
        device_delay_frames: Option<u64>,
        offset_us: i64,
    ) -> Timecode {
        let base_us = now.unix_micros().saturating_add(offset_us);
        let buffer_delay_us = delay_frames_to_us(device_delay_frames.unwrap_or(0), self.sample_rate);
        let lead_us = self
            .curve
            .offset_us(now.second_fraction(), self.rate.frame_duration_us());
        self.timecode_at(base_us.saturating_add(buffer_delay_us).saturating_add(lead_us))
    }

    /// Timecode for human display: offset applied, no device or curve compensation.
    pub fn compute_display(&self, now: WallClockSample, offset_us: i64) -> Timecode {
        self.timecode_at(now.unix_micros().saturating_add(offset_us))
    }

    fn timecode_at(&self, adjusted_us: i64) -> Timecode {
        let whole_seconds = adjusted_us.div_euclid(MICROS_PER_SECOND);
        let frac_us = adjusted_us.rem_euclid(MICROS_PER_SECOND);

        let mut timecode = Timecode::civil(whole_seconds, self.zone);
        timecode.frame = frame_in_second(frac_us, self.rate, timecode.minute);
        timecode
    }
}

/// Frame number for `frac_us` microseconds into a second of minute `minute`.
pub fn frame_in_second(frac_us: i64, rate: &FrameRateSpec, minute: u8) -> u8 {
    let per_second = rate.frames_per_second() as i64;
    let frame = (frac_us / rate.frame_duration_us()).clamp(0, per_second - 1);

    // Drop-frame skips numbers 0 and 1 except on every tenth minute.
    if rate.drop_frame && minute % 10 != 0 && frame < 2 {
        return 2;
    }
    frame as u8
}
