// ABOUTME: Library root for ltc-clock
// ABOUTME: Wall-clock LTC generation with latency compensation and NTP offset slewing

/// Audio output sinks, LTC encoding, and output level
pub mod audio;
/// Generator configuration (CLI overlay, config file, defaults)
pub mod config;
/// Thread coordination for the audio, display, and sync loops
pub mod coordinator;
/// Crate-wide error type
pub mod error;
/// Sync offset state and NTP synchronizer
pub mod sync;
/// Process setup: CPU pinning, memory locking, thread priorities, signals
pub mod system;
/// Frame rates, timecode values, and the timecode clock engine
pub mod timecode;

pub use config::GeneratorConfig;
pub use coordinator::{ClockContext, Coordinator, StopFlag};
pub use error::Error;
pub use sync::{ClockOffset, NtpSynchronizer};
pub use timecode::{FrameRateSpec, Timecode, TimecodeClock};

/// Fixed output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Microseconds per second, the time base of every clock computation.
pub const MICROS_PER_SECOND: i64 = 1_000_000;
