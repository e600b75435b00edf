// ABOUTME: Audio-pacing loop
// ABOUTME: Computes, encodes, and writes one timecode frame per iteration, paced by the sink's back-pressure

use crate::audio::{AudioSink, TimecodeEncoder};
use crate::coordinator::ClockContext;
use crate::timecode::WallClockSample;
use std::thread;
use std::time::Duration;

/// Pause after a failed recovery before trying again.
const RECOVERY_BACKOFF: Duration = Duration::from_millis(100);

/// What the audio loop did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioLoopStats {
    /// Timecode frames written to the sink.
    pub frames: u64,
    /// Sample frames accepted by the sink.
    pub samples: u64,
    pub write_errors: u64,
    pub recoveries: u64,
}

/// Run until stop is requested.
///
/// Each iteration reads the clock, asks the sink for its delay, advances the
/// offset slew by one step, and writes the encoded frame. Write errors are
/// recovered in place unless a stop is already pending.
pub fn run_audio_loop<S, E>(context: &ClockContext, sink: &mut S, encoder: &mut E) -> AudioLoopStats
where
    S: AudioSink + ?Sized,
    E: TimecodeEncoder + ?Sized,
{
    let mut stats = AudioLoopStats::default();

    while !context.stop.is_requested() {
        let now = WallClockSample::now();
        let delay = sink.output_delay_frames();
        let offset_us = context.offsets.advance_frame();
        let timecode = context.clock.compute_paced(now, delay, offset_us);

        let samples = encoder.encode(&timecode);
        match sink.write(samples) {
            Ok(written) => {
                stats.frames += 1;
                stats.samples += written as u64;
            }
            Err(e) => {
                if context.stop.is_requested() {
                    break;
                }
                stats.write_errors += 1;
                log::warn!("Audio write failed: {}", e);
                match sink.recover(&e) {
                    Ok(()) => stats.recoveries += 1,
                    Err(re) => {
                        log::error!("Audio recovery failed: {}", re);
                        thread::sleep(RECOVERY_BACKOFF);
                    }
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{LtcEncoder, OutputLevel};
    use crate::coordinator::StopFlag;
    use crate::error::Error;
    use crate::timecode::{lookup, TimecodeClock};
    use crate::SAMPLE_RATE;

    /// Fails every write; recovery fails too and asks for a stop on the `stop_after`th call.
    struct BrokenSink {
        stop: StopFlag,
        stop_on_write: bool,
        stop_after: usize,
        writes: usize,
        recover_calls: usize,
    }

    impl BrokenSink {
        fn new(stop: StopFlag) -> Self {
            Self {
                stop,
                stop_on_write: false,
                stop_after: usize::MAX,
                writes: 0,
                recover_calls: 0,
            }
        }
    }

    impl AudioSink for BrokenSink {
        fn write(&mut self, _samples: &[i16]) -> Result<usize, Error> {
            self.writes += 1;
            if self.stop_on_write {
                self.stop.request();
            }
            Err(Error::Output("device gone".to_string()))
        }

        fn output_delay_frames(&self) -> Option<u64> {
            None
        }

        fn recover(&mut self, _error: &Error) -> Result<(), Error> {
            self.recover_calls += 1;
            if self.recover_calls >= self.stop_after {
                self.stop.request();
            }
            Err(Error::Output("still gone".to_string()))
        }

        fn drain(&mut self) {}
    }

    fn context_and_encoder() -> (ClockContext, LtcEncoder) {
        let rate = lookup("25").unwrap();
        let context = ClockContext::new(TimecodeClock::new(rate));
        let encoder = LtcEncoder::new(SAMPLE_RATE, rate, OutputLevel::default()).unwrap();
        (context, encoder)
    }

    #[test]
    fn test_write_error_during_stop_skips_recovery() {
        let (context, mut encoder) = context_and_encoder();
        let mut sink = BrokenSink::new(context.stop.clone());
        sink.stop_on_write = true;

        let stats = run_audio_loop(&context, &mut sink, &mut encoder);

        assert_eq!(sink.writes, 1);
        assert_eq!(sink.recover_calls, 0);
        assert_eq!(stats, AudioLoopStats::default());
    }

    #[test]
    fn test_failed_recovery_keeps_looping_until_stop() {
        let (context, mut encoder) = context_and_encoder();
        let mut sink = BrokenSink::new(context.stop.clone());
        sink.stop_after = 3;

        let stats = run_audio_loop(&context, &mut sink, &mut encoder);

        assert_eq!(sink.writes, 3);
        assert_eq!(sink.recover_calls, 3);
        assert_eq!(stats.write_errors, 3);
        assert_eq!(stats.recoveries, 0);
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.samples, 0);
    }
}
