// ABOUTME: Console timecode display loop
// ABOUTME: Polls the display clock and redraws a single carriage-return line only when the timecode changes

use crate::coordinator::ClockContext;
use crate::timecode::{DisplayLine, Timecode, WallClockSample};
use std::io::Write;
use std::thread;
use std::time::Duration;

/// Default redraw poll interval.
pub const DISPLAY_INTERVAL: Duration = Duration::from_millis(5);

/// Last timecode drawn; owned by the display thread.
#[derive(Debug, Default)]
pub struct DisplaySnapshot {
    last: Option<Timecode>,
}

impl DisplaySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `timecode`; true when it differs from the last one drawn.
    pub fn update(&mut self, timecode: Timecode) -> bool {
        if self.last == Some(timecode) {
            return false;
        }
        self.last = Some(timecode);
        true
    }

    pub fn last(&self) -> Option<&Timecode> {
        self.last.as_ref()
    }
}

/// Redraw the display line until stop is requested, then end the line.
///
/// The current timecode is always drawn at least once.
/// A write failure (closed terminal, broken pipe) ends the loop early.
pub fn run_display_loop<W: Write>(context: &ClockContext, out: &mut W, interval: Duration) {
    let mut snapshot = DisplaySnapshot::new();
    let rate = context.clock.rate();

    loop {
        let timecode = context
            .clock
            .compute_display(WallClockSample::now(), context.offsets.current_us());

        if snapshot.update(timecode) {
            let line = DisplayLine {
                timecode: &timecode,
                rate,
            };
            if let Err(e) = write!(out, "{}", line).and_then(|()| out.flush()) {
                log::debug!("Display output closed: {}", e);
                return;
            }
        }

        if context.stop.is_requested() {
            break;
        }
        thread::sleep(interval);
    }

    if let Err(e) = writeln!(out).and_then(|()| out.flush()) {
        log::debug!("Display output closed: {}", e);
    }
}
