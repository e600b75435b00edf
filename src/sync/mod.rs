// ABOUTME: Network time synchronization for ltc-clock
// ABOUTME: Shared slewed offset state, SNTP client, and the periodic synchronizer

/// SNTP packet encoding and UDP client
pub mod ntp;
/// Lock-protected offset state and slew policy
pub mod offset;
/// Offset measurement, filtering, and the sync loop
pub mod synchronizer;

pub use ntp::{NtpClient, NtpTimestamp, TimeSource};
pub use offset::{ClockOffset, OffsetState, SlewPolicy, MAX_OFFSET_US};
pub use synchronizer::{
    run_sync_loop, select_offset, NtpSample, NtpSettings, NtpSynchronizer, SyncSchedule,
};
