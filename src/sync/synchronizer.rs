// ABOUTME: Network time offset synchronizer
// ABOUTME: Batches NTP queries, picks the least-perturbed offset, and retargets the slewed clock offset

use crate::coordinator::StopFlag;
use crate::error::Error;
use crate::sync::ntp::{NtpClient, TimeSource, NTP_PORT};
use crate::sync::offset::{ClockOffset, SlewPolicy, MAX_OFFSET_US};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One round-trip result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpSample {
    pub offset_us: i64,
    pub valid: bool,
}

impl NtpSample {
    /// Sample that is valid when `|offset_us|` is under `max_offset_us`.
    pub fn checked(offset_us: i64, max_offset_us: i64) -> Self {
        Self {
            offset_us,
            valid: offset_us.saturating_abs() < max_offset_us,
        }
    }

    /// A round trip that produced no measurement.
    pub fn failed() -> Self {
        Self {
            offset_us: 0,
            valid: false,
        }
    }
}

/// Pick the best offset from a batch.
///
/// Seeds with the average of the valid samples, then takes any valid sample
/// of strictly smaller magnitude. Returns `None` when nothing is valid.
pub fn select_offset(samples: &[NtpSample]) -> Option<i64> {
    let valid: Vec<i64> = samples
        .iter()
        .filter(|s| s.valid)
        .map(|s| s.offset_us)
        .collect();
    if valid.is_empty() {
        return None;
    }

    let sum: i128 = valid.iter().map(|&v| v as i128).sum();
    let mut best = (sum / valid.len() as i128) as i64;
    for &offset in &valid {
        if offset.saturating_abs() < best.saturating_abs() {
            best = offset;
        }
    }
    Some(best)
}

/// Query parameters for one sync attempt.
#[derive(Debug, Clone)]
pub struct NtpSettings {
    /// UDP port of the server.
    pub port: u16,
    /// Round trips per attempt.
    pub query_count: usize,
    /// Pause between round trips.
    pub query_spacing: Duration,
    /// Receive timeout per round trip.
    pub timeout: Duration,
    /// Exclusive bound on a plausible offset.
    pub max_offset_us: i64,
}

impl Default for NtpSettings {
    fn default() -> Self {
        Self {
            port: NTP_PORT,
            query_count: 5,
            query_spacing: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
            max_offset_us: MAX_OFFSET_US,
        }
    }
}

/// When the sync loop runs.
#[derive(Debug, Clone, Copy)]
pub struct SyncSchedule {
    /// Time between sync attempts.
    pub interval: Duration,
    /// Sleep granularity; bounds how long shutdown waits on the loop.
    pub poll: Duration,
}

impl SyncSchedule {
    pub fn every_secs(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            poll: Duration::from_secs(1),
        }
    }
}

/// Measures the offset to one server and feeds it to the shared [`ClockOffset`].
pub struct NtpSynchronizer {
    server: String,
    settings: NtpSettings,
    slew: SlewPolicy,
    offsets: Arc<ClockOffset>,
    stop: Option<StopFlag>,
}

impl NtpSynchronizer {
    pub fn new(
        server: impl Into<String>,
        settings: NtpSettings,
        slew: SlewPolicy,
        offsets: Arc<ClockOffset>,
    ) -> Self {
        Self {
            server: server.into(),
            settings,
            slew,
            offsets,
            stop: None,
        }
    }

    /// Abandon an attempt between queries once `stop` is requested.
    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// One full attempt against the configured server.
    ///
    /// On success the chosen offset becomes the new slew target. Any failure
    /// leaves the previous target in effect.
    pub fn sync_once(&self) -> Result<i64, Error> {
        let mut client = NtpClient::connect(&self.server, self.settings.port, self.settings.timeout)?;
        log::debug!("Querying {} at {}", self.server, client.server());
        self.sync_with(&mut client)
    }

    /// Run an attempt against any [`TimeSource`].
    pub fn sync_with<S: TimeSource>(&self, source: &mut S) -> Result<i64, Error> {
        let samples = self.collect(source);
        if self.stop_requested() {
            return Err(Error::Interrupted);
        }
        let offset = select_offset(&samples).ok_or(Error::NoValidSamples)?;
        let step = self.offsets.apply_target(offset, &self.slew)?;
        log::debug!("Offset target {}us, slew step {}us/frame", offset, step);
        Ok(offset)
    }

    fn collect<S: TimeSource>(&self, source: &mut S) -> Vec<NtpSample> {
        let count = self.settings.query_count;
        let mut samples = Vec::with_capacity(count);
        for i in 0..count {
            if self.stop_requested() {
                break;
            }
            let sample = match source.measure() {
                Ok(offset) => {
                    let sample = NtpSample::checked(offset, self.settings.max_offset_us);
                    if !sample.valid {
                        log::debug!("Discarding implausible offset {}us", offset);
                    }
                    sample
                }
                Err(e) => {
                    log::debug!("NTP query {} of {} failed: {}", i + 1, count, e);
                    NtpSample::failed()
                }
            };
            samples.push(sample);

            if i + 1 < count && !self.settings.query_spacing.is_zero() && !self.stop_requested() {
                thread::sleep(self.settings.query_spacing);
            }
        }
        samples
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(StopFlag::is_requested)
    }
}

/// Periodic sync until `stop` is requested.
///
/// Sleeps in `schedule.poll` increments so a stop request is seen within one
/// poll; an attempt already in flight is allowed to finish.
pub fn run_sync_loop(synchronizer: &NtpSynchronizer, stop: &StopFlag, schedule: SyncSchedule) {
    while !stop.is_requested() {
        let started = Instant::now();
        while started.elapsed() < schedule.interval {
            if stop.is_requested() {
                return;
            }
            thread::sleep(schedule.poll.min(schedule.interval));
        }
        if stop.is_requested() {
            return;
        }

        match synchronizer.sync_once() {
            Ok(offset) => log::info!(
                "NTP sync with {} succeeded, target offset {}us",
                synchronizer.server(),
                offset
            ),
            Err(e) => log::warn!("NTP sync with {} failed: {}", synchronizer.server(), e),
        }
    }
}
