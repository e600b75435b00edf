// ABOUTME: Audio side of ltc-clock
// ABOUTME: LTC waveform encoding, output level, and back-pressured output sinks

/// SMPTE 12M frame packing and biphase-mark rendering
pub mod encoder;
/// Output level in dBFS
pub mod level;
/// AudioSink trait and the cpal sink
pub mod output;

pub use encoder::{LtcEncoder, LtcFrame, TimecodeEncoder};
pub use level::OutputLevel;
pub use output::{list_output_devices, AudioSink, CpalSink, BUFFERED_FRAMES, DEFAULT_DEVICE};
