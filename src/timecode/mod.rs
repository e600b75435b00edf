// ABOUTME: Timecode generation for ltc-clock
// ABOUTME: Frame rate table, timecode values, correction curve, and the clock engine

/// Timecode clock engine (paced and display variants)
pub mod clock;
/// Intra-second output timing correction
pub mod correction;
/// Supported frame rate table
pub mod rates;
/// Timecode value and civil time conversion
pub mod types;

pub use clock::{TimecodeClock, WallClockSample};
pub use correction::CorrectionCurve;
pub use rates::{lookup, FrameRateSpec, TvStandard, SUPPORTED_RATES};
pub use types::{CivilZone, DisplayLine, Timecode};
