// ABOUTME: Supported frame rate table for LTC output
// ABOUTME: Name lookup, exact rational rates, and per-rate frame/sample sizing

use crate::error::Error;
use crate::MICROS_PER_SECOND;
use std::fmt;

/// Television standard an LTC rate belongs to.
///
/// Decides where the biphase polarity correction bit lives in the LTC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvStandard {
    /// 525 lines / 60 fields (24, 29.97, 30 fps)
    Ntsc525_60,
    /// 625 lines / 50 fields (25 fps)
    Pal625_50,
}

/// One supported frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateSpec {
    /// Nominal frames per second as a float (29.97 for NTSC rates).
    pub fps: f64,
    /// Numerator of the exact frame rate.
    pub numerator: i64,
    /// Denominator of the exact frame rate.
    pub denominator: i64,
    /// Television standard.
    pub standard: TvStandard,
    /// Whether frame numbers 0 and 1 are skipped at most minute boundaries.
    pub drop_frame: bool,
    /// Unique lookup name.
    pub name: &'static str,
}

/// All rates the generator supports. Lookup is by `name`.
pub static SUPPORTED_RATES: [FrameRateSpec; 6] = [
    FrameRateSpec {
        fps: 24.0,
        numerator: 24_000,
        denominator: 1_000,
        standard: TvStandard::Ntsc525_60,
        drop_frame: false,
        name: "24",
    },
    FrameRateSpec {
        fps: 25.0,
        numerator: 25_000,
        denominator: 1_000,
        standard: TvStandard::Pal625_50,
        drop_frame: false,
        name: "25",
    },
    FrameRateSpec {
        fps: 29.97,
        numerator: 30_000,
        denominator: 1_001,
        standard: TvStandard::Ntsc525_60,
        drop_frame: false,
        name: "29.97",
    },
    FrameRateSpec {
        fps: 30.0,
        numerator: 30_000,
        denominator: 1_000,
        standard: TvStandard::Ntsc525_60,
        drop_frame: false,
        name: "30",
    },
    FrameRateSpec {
        fps: 29.97,
        numerator: 30_000,
        denominator: 1_001,
        standard: TvStandard::Ntsc525_60,
        drop_frame: true,
        name: "29.97df",
    },
    FrameRateSpec {
        fps: 30.0,
        numerator: 30_000,
        denominator: 1_000,
        standard: TvStandard::Ntsc525_60,
        drop_frame: true,
        name: "30df",
    },
];

/// Name of the rate used when nothing else is configured.
pub const DEFAULT_RATE_NAME: &str = "25";

/// Look up a rate by its exact name.
pub fn lookup(name: &str) -> Result<&'static FrameRateSpec, Error> {
    SUPPORTED_RATES
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| Error::UnknownFrameRate(name.to_string()))
}

/// The default rate (25 fps).
pub fn default_rate() -> &'static FrameRateSpec {
    &SUPPORTED_RATES[1]
}

/// Names of every supported rate, in table order.
pub fn rate_names() -> impl Iterator<Item = &'static str> {
    SUPPORTED_RATES.iter().map(|spec| spec.name)
}

impl FrameRateSpec {
    /// Frame numbers per second: `round(fps)`, so 30 for 29.97.
    pub fn frames_per_second(&self) -> u8 {
        self.fps.round() as u8
    }

    /// Exact duration of one frame in whole microseconds.
    ///
    /// 33366 for 29.97, 40000 for 25. Derived from the rational rate so
    /// frame 0 always starts on the second boundary.
    pub fn frame_duration_us(&self) -> i64 {
        (MICROS_PER_SECOND * self.denominator) / self.numerator
    }

    /// LTC audio samples per frame at `sample_rate`, possibly fractional.
    pub fn samples_per_frame(&self, sample_rate: u32) -> f64 {
        (sample_rate as f64 * self.denominator as f64) / self.numerator as f64
    }

    /// Samples per frame rounded to the nearest whole sample, used for buffer sizing.
    pub fn nominal_frame_size(&self, sample_rate: u32) -> usize {
        self.samples_per_frame(sample_rate).round() as usize
    }
}

impl fmt::Display for FrameRateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fps ({:.3}), drop frame: {}",
            self.name,
            self.fps,
            if self.drop_frame { "YES" } else { "NO" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_every_name() {
        for spec in SUPPORTED_RATES.iter() {
            let found = lookup(spec.name).unwrap();
            assert_eq!(found, spec);
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        assert!(matches!(lookup("29.970"), Err(Error::UnknownFrameRate(_))));
        assert!(matches!(lookup("30DF"), Err(Error::UnknownFrameRate(_))));
        assert!(matches!(lookup(""), Err(Error::UnknownFrameRate(_))));
        assert!(!lookup("29.97").unwrap().drop_frame);
        assert!(lookup("29.97df").unwrap().drop_frame);
    }

    #[test]
    fn test_names_unique() {
        let names: Vec<_> = rate_names().collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_frame_durations() {
        assert_eq!(lookup("25").unwrap().frame_duration_us(), 40_000);
        assert_eq!(lookup("24").unwrap().frame_duration_us(), 41_666);
        assert_eq!(lookup("30").unwrap().frame_duration_us(), 33_333);
        assert_eq!(lookup("29.97").unwrap().frame_duration_us(), 33_366);
    }

    #[test]
    fn test_frames_per_second_rounds_ntsc() {
        assert_eq!(lookup("29.97").unwrap().frames_per_second(), 30);
        assert_eq!(lookup("24").unwrap().frames_per_second(), 24);
    }

    #[test]
    fn test_samples_per_frame() {
        assert_eq!(lookup("25").unwrap().nominal_frame_size(48_000), 1920);
        assert_eq!(lookup("30").unwrap().nominal_frame_size(48_000), 1600);
        assert_eq!(lookup("29.97").unwrap().nominal_frame_size(48_000), 1602);
        let exact = lookup("29.97df").unwrap().samples_per_frame(48_000);
        assert!((exact - 1601.6).abs() < 1e-9);
    }

    #[test]
    fn test_standards() {
        assert_eq!(lookup("25").unwrap().standard, TvStandard::Pal625_50);
        assert_eq!(lookup("30df").unwrap().standard, TvStandard::Ntsc525_60);
    }
}
