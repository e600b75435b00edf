// ABOUTME: Error types for ltc-clock
// ABOUTME: Single crate-wide error enum covering setup, audio, and network time faults

use thiserror::Error;

/// Errors produced by the timecode generator.
///
/// Variants map onto three fault classes: transient I/O faults (`Output`, `Io`),
/// validation faults (`Protocol`, `OffsetOutOfRange`, `NoValidSamples`, `Resolve`),
/// and setup faults (`UnknownFrameRate`, `Config`, `Encoder`, `System`, `Spawn`).
/// `Interrupted` marks work abandoned because shutdown was requested.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame rate name not present in the supported table
    #[error("unknown frame rate '{0}' (supported: 24, 25, 29.97, 30, 29.97df, 30df)")]
    UnknownFrameRate(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio output device failure
    #[error("audio output error: {0}")]
    Output(String),

    /// Timecode encoder could not be created
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Time server host name did not resolve to a usable address
    #[error("failed to resolve time server '{0}'")]
    Resolve(String),

    /// Socket or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unusable NTP response
    #[error("invalid NTP response: {0}")]
    Protocol(String),

    /// Measured offset exceeded the sanity bound
    #[error("offset of {0} us exceeds the sanity bound")]
    OffsetOutOfRange(i64),

    /// Every query of a sync attempt failed or was rejected
    #[error("no valid NTP samples")]
    NoValidSamples,

    /// Shutdown was requested before the operation finished
    #[error("interrupted by shutdown")]
    Interrupted,

    /// Process setup (affinity, priority, memory locking, signals) failed
    #[error("system setup error: {0}")]
    System(String),

    /// A worker thread could not be started
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),
}
