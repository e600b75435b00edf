// ABOUTME: Thread coordination for ltc-clock
// ABOUTME: Shared clock context, cooperative stop flag, and the audio/display/sync thread lifecycle

/// Audio-pacing loop
pub mod audio_loop;
/// Console display loop
pub mod display;

pub use audio_loop::{run_audio_loop, AudioLoopStats};
pub use display::{run_display_loop, DisplaySnapshot, DISPLAY_INTERVAL};

use crate::audio::{AudioSink, TimecodeEncoder};
use crate::error::Error;
use crate::sync::{run_sync_loop, ClockOffset, NtpSynchronizer, SyncSchedule};
use crate::system::{self, RealtimePolicy};
use crate::timecode::TimecodeClock;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cooperative cancellation shared by every loop and the signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registration with signal handlers.
    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// State handed to every loop at spawn time.
#[derive(Debug, Clone)]
pub struct ClockContext {
    pub clock: TimecodeClock,
    pub offsets: Arc<ClockOffset>,
    pub stop: StopFlag,
}

impl ClockContext {
    /// Context with a zeroed offset and a fresh stop flag.
    pub fn new(clock: TimecodeClock) -> Self {
        Self {
            clock,
            offsets: Arc::new(ClockOffset::new()),
            stop: StopFlag::new(),
        }
    }
}

/// Outcome of [`Coordinator::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    pub audio: AudioLoopStats,
    /// Offset chosen by the startup sync, if it succeeded.
    pub initial_offset_us: Option<i64>,
    /// Scheduling the audio thread obtained, if promotion was attempted and worked.
    pub realtime: Option<RealtimePolicy>,
}

/// Owns the thread lifecycle: startup sync, worker spawn, audio loop, ordered shutdown.
pub struct Coordinator {
    context: ClockContext,
    display: Option<Box<dyn Write + Send>>,
    display_interval: Duration,
    sync: Option<(NtpSynchronizer, SyncSchedule)>,
    realtime: bool,
}

impl Coordinator {
    pub fn new(context: ClockContext) -> Self {
        Self {
            context,
            display: None,
            display_interval: DISPLAY_INTERVAL,
            sync: None,
            realtime: true,
        }
    }

    /// Draw the timecode line to `out`.
    pub fn with_display(mut self, out: Box<dyn Write + Send>) -> Self {
        self.display = Some(out);
        self
    }

    pub fn with_display_interval(mut self, interval: Duration) -> Self {
        self.display_interval = interval;
        self
    }

    /// Run a startup sync and then the periodic sync loop.
    pub fn with_sync(mut self, synchronizer: NtpSynchronizer, schedule: SyncSchedule) -> Self {
        let synchronizer = synchronizer.with_stop(self.context.stop.clone());
        self.sync = Some((synchronizer, schedule));
        self
    }

    /// Whether the coordinating thread requests real-time scheduling.
    pub fn with_realtime(mut self, enabled: bool) -> Self {
        self.realtime = enabled;
        self
    }

    pub fn context(&self) -> &ClockContext {
        &self.context
    }

    /// Run until the stop flag is set.
    ///
    /// The audio loop runs on the calling thread. On exit the sink and encoder
    /// are drained and dropped before the display and sync threads are joined.
    pub fn run<S, E>(self, mut sink: S, mut encoder: E) -> Result<RunReport, Error>
    where
        S: AudioSink,
        E: TimecodeEncoder,
    {
        let Coordinator {
            context,
            display,
            display_interval,
            sync,
            realtime,
        } = self;
        let mut report = RunReport::default();
        let mut workers = Workers::default();

        if let Some(out) = display {
            let ctx = context.clone();
            let spawned = thread::Builder::new()
                .name("ltc-display".into())
                .spawn(move || {
                    if let Err(e) = system::demote_to_idle() {
                        log::debug!("Display thread keeps default priority: {}", e);
                    }
                    let mut out = out;
                    run_display_loop(&ctx, &mut out, display_interval);
                });
            workers.push("display", spawned, &context.stop)?;
        }

        if let Some((synchronizer, schedule)) = sync {
            match synchronizer.sync_once() {
                Ok(offset) => {
                    log::info!(
                        "Initial NTP sync with {} succeeded, target offset {}us",
                        synchronizer.server(),
                        offset
                    );
                    report.initial_offset_us = Some(offset);
                }
                Err(e) => log::warn!(
                    "Initial NTP sync with {} failed: {}",
                    synchronizer.server(),
                    e
                ),
            }

            let stop = context.stop.clone();
            let spawned = thread::Builder::new()
                .name("ltc-sync".into())
                .spawn(move || run_sync_loop(&synchronizer, &stop, schedule));
            workers.push("sync", spawned, &context.stop)?;
        }

        if realtime {
            match system::promote_to_realtime() {
                Ok(policy) => {
                    log::info!("Audio thread scheduling: {:?}", policy);
                    report.realtime = Some(policy);
                }
                Err(e) => log::warn!("Audio thread keeps default priority: {}", e),
            }
        }

        report.audio = run_audio_loop(&context, &mut sink, &mut encoder);

        sink.drain();
        drop(sink);
        drop(encoder);

        context.stop.request();
        workers.join_all();

        Ok(report)
    }
}

/// Worker threads in join order.
#[derive(Default)]
struct Workers {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Workers {
    /// Keep a spawned thread, or stop and join the ones already running.
    fn push(
        &mut self,
        name: &'static str,
        spawned: std::io::Result<JoinHandle<()>>,
        stop: &StopFlag,
    ) -> Result<(), Error> {
        match spawned {
            Ok(handle) => {
                self.handles.push((name, handle));
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to spawn {} thread: {}", name, e);
                stop.request();
                self.join_all();
                Err(Error::Spawn(name))
            }
        }
    }

    fn join_all(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
            }
        }
    }
}
