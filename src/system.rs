// ABOUTME: Process and thread setup for low-jitter output
// ABOUTME: CPU pinning, memory locking, scheduling priorities, signal registration, and console detection

use crate::coordinator::StopFlag;
use crate::error::Error;
use std::io::IsTerminal;

/// Scheduling the audio thread ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimePolicy {
    Fifo,
    RoundRobin,
    /// Best-effort maximum priority under the normal scheduler.
    Elevated,
}

/// Crossplatform priority requested for the realtime policies.
#[cfg(unix)]
const REALTIME_PRIORITY: u8 = 20;

/// Pin the whole process to `core`.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core: usize) -> Result<(), Error> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(Error::System(format!("CPU core {} out of range", core)));
    }
    // SAFETY: cpu_set_t is plain data; CPU_ZERO/CPU_SET only touch the local set.
    let result = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if result != 0 {
        return Err(Error::System(format!(
            "sched_setaffinity to core {}: {}",
            core,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(core: usize) -> Result<(), Error> {
    Err(Error::System(format!(
        "CPU pinning to core {} is only supported on Linux",
        core
    )))
}

/// Lock current and future pages into RAM.
#[cfg(unix)]
pub fn lock_memory() -> Result<(), Error> {
    // SAFETY: mlockall takes flags only.
    let result = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if result != 0 {
        return Err(Error::System(format!(
            "mlockall: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn lock_memory() -> Result<(), Error> {
    Err(Error::System("memory locking is only supported on Unix".to_string()))
}

/// Raise the calling thread to real-time scheduling.
///
/// Tries FIFO, then round-robin, then the highest normal priority.
#[cfg(unix)]
pub fn promote_to_realtime() -> Result<RealtimePolicy, Error> {
    use thread_priority::{
        set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
        ThreadPriority, ThreadPriorityValue, ThreadSchedulePolicy,
    };

    let value = ThreadPriorityValue::try_from(REALTIME_PRIORITY)
        .map_err(|e| Error::System(e.to_string()))?;
    let attempts = [
        (RealtimeThreadSchedulePolicy::Fifo, RealtimePolicy::Fifo),
        (RealtimeThreadSchedulePolicy::RoundRobin, RealtimePolicy::RoundRobin),
    ];
    for (policy, outcome) in attempts {
        match set_thread_priority_and_policy(
            thread_native_id(),
            ThreadPriority::Crossplatform(value),
            ThreadSchedulePolicy::Realtime(policy),
        ) {
            Ok(()) => return Ok(outcome),
            Err(e) => log::debug!("{:?} scheduling unavailable: {:?}", outcome, e),
        }
    }

    thread_priority::set_current_thread_priority(ThreadPriority::Max)
        .map(|()| RealtimePolicy::Elevated)
        .map_err(|e| Error::System(format!("no elevated priority available: {:?}", e)))
}

#[cfg(not(unix))]
pub fn promote_to_realtime() -> Result<RealtimePolicy, Error> {
    thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max)
        .map(|()| RealtimePolicy::Elevated)
        .map_err(|e| Error::System(format!("no elevated priority available: {:?}", e)))
}

/// Drop the calling thread to idle scheduling.
#[cfg(unix)]
pub fn demote_to_idle() -> Result<(), Error> {
    use thread_priority::{
        set_thread_priority_and_policy, thread_native_id, NormalThreadSchedulePolicy,
        ThreadPriority, ThreadSchedulePolicy,
    };

    #[cfg(target_os = "linux")]
    let policy = NormalThreadSchedulePolicy::Idle;
    #[cfg(not(target_os = "linux"))]
    let policy = NormalThreadSchedulePolicy::Other;

    set_thread_priority_and_policy(
        thread_native_id(),
        ThreadPriority::Min,
        ThreadSchedulePolicy::Normal(policy),
    )
    .map_err(|e| Error::System(format!("idle scheduling: {:?}", e)))
}

#[cfg(not(unix))]
pub fn demote_to_idle() -> Result<(), Error> {
    thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Min)
        .map_err(|e| Error::System(format!("idle scheduling: {:?}", e)))
}

/// Stdout is a terminal and the process is not running as a systemd unit.
pub fn is_console_interactive() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("INVOCATION_ID").is_none()
}

/// Set `stop` on SIGINT or SIGTERM.
pub fn register_signals(stop: &StopFlag) -> Result<(), Error> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, stop.handle())
            .map_err(|e| Error::System(format!("registering signal {}: {}", signal, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_pin_rejects_out_of_range_core() {
        let err = pin_to_core(libc::CPU_SETSIZE as usize + 1).unwrap_err();
        assert!(matches!(err, Error::System(_)));
    }

    #[test]
    fn test_register_signals() {
        let stop = StopFlag::new();
        register_signals(&stop).unwrap();
        assert!(!stop.is_requested());
    }
}
