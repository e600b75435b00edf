// ABOUTME: Shared sync offset state with per-frame slewing
// ABOUTME: Target and step written by the synchronizer, current offset advanced by the audio path

use crate::error::Error;
use parking_lot::Mutex;

/// Largest offset (exclusive) accepted from a time server, in microseconds.
pub const MAX_OFFSET_US: i64 = 10_000_000;

/// How fast a new target is approached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlewPolicy {
    /// Seconds over which the whole correction is spread.
    pub period_secs: u64,
    /// Audio frames per second (one slew step per frame).
    pub fps: f64,
}

impl SlewPolicy {
    pub fn new(period_secs: u64, fps: f64) -> Self {
        Self { period_secs, fps }
    }

    /// Number of audio frames the correction is spread over.
    pub fn frames(&self) -> i64 {
        (self.period_secs as f64 * self.fps) as i64
    }

    /// Per-frame step toward `diff`.
    ///
    /// Rounds toward zero but never to zero for a non-zero `diff`, so the
    /// offset always progresses.
    pub fn step_for(&self, diff: i64) -> i64 {
        let frames = self.frames();
        if frames <= 0 {
            return diff;
        }
        let step = diff / frames;
        if step == 0 && diff != 0 {
            diff.signum()
        } else {
            step
        }
    }
}

/// Plain offset fields. Guarded by [`ClockOffset`]'s lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetState {
    /// Offset applied to the clock right now.
    pub current_us: i64,
    /// Offset the slew converges toward.
    pub target_us: i64,
    /// Amount `current_us` moves per audio frame; 0 when converged.
    pub step_us: i64,
}

impl OffsetState {
    /// Return the offset for this frame, then move one step toward the target.
    ///
    /// Snaps to the target (and clears the step) when the step would reach or
    /// pass it, so the offset never overshoots.
    pub fn advance(&mut self) -> i64 {
        let applied = self.current_us;
        if self.current_us != self.target_us && self.step_us != 0 {
            let next = self.current_us.saturating_add(self.step_us);
            let reached = if self.step_us > 0 {
                next >= self.target_us
            } else {
                next <= self.target_us
            };
            if reached {
                self.current_us = self.target_us;
                self.step_us = 0;
            } else {
                self.current_us = next;
            }
        }
        applied
    }

    /// Set a new target and the step that reaches it over `policy`.
    pub fn retarget(&mut self, target_us: i64, policy: &SlewPolicy) {
        self.target_us = target_us;
        self.step_us = policy.step_for(target_us - self.current_us);
    }

    /// True once the applied offset equals the target.
    pub fn converged(&self) -> bool {
        self.current_us == self.target_us
    }
}

/// Lock-protected offset state shared by the audio, display, and sync threads.
///
/// Every method holds the lock only for the few instructions that touch the
/// fields.
#[derive(Debug, Default)]
pub struct ClockOffset {
    state: Mutex<OffsetState>,
}

impl ClockOffset {
    /// Zeroed state: no offset, no target, no slew.
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio path: offset for this frame, advancing the slew by one step.
    pub fn advance_frame(&self) -> i64 {
        self.state.lock().advance()
    }

    /// Current applied offset without advancing (display path).
    pub fn current_us(&self) -> i64 {
        self.state.lock().current_us
    }

    /// Copy of all fields.
    pub fn snapshot(&self) -> OffsetState {
        *self.state.lock()
    }

    /// Synchronizer path: validate `target_us` and retarget the slew.
    ///
    /// Returns the new per-frame step. An out-of-range target leaves the state
    /// untouched.
    pub fn apply_target(&self, target_us: i64, policy: &SlewPolicy) -> Result<i64, Error> {
        if target_us.saturating_abs() >= MAX_OFFSET_US {
            return Err(Error::OffsetOutOfRange(target_us));
        }
        let mut state = self.state.lock();
        state.retarget(target_us, policy);
        Ok(state.step_us)
    }
}
