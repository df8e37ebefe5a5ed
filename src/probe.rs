// Copyright 2024-2025 Irreducible Inc.

//! Process memory and CPU clock sampling.

use std::time::Duration;

use cfg_if::cfg_if;
use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeValLike;
use nix::time::{clock_gettime, ClockId};
use nix::unistd::{sysconf, SysconfVar};

const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Source of the scalar signals a writer records for every event.
///
/// Implementations must be cheap: `rss` is called once per host event.
pub trait Probe: Send {
    /// Current resident set size in bytes.
    fn rss(&self) -> u64;

    /// Peak resident set size in bytes.
    fn peak_rss(&self) -> u64;

    /// CPU time consumed by the process so far.
    fn cpu_time(&self) -> Duration;
}

/// Probe backed by the operating system's view of this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProbe;

impl Probe for ProcessProbe {
    fn rss(&self) -> u64 {
        current_rss()
    }

    fn peak_rss(&self) -> u64 {
        peak_rss()
    }

    fn cpu_time(&self) -> Duration {
        process_cpu_time()
    }
}

/// Size of a memory page, 4096 if the system does not say.
pub fn page_size() -> u64 {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as u64,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Peak resident set size in bytes, or 0 if unavailable.
pub fn peak_rss() -> u64 {
    let Ok(usage) = getrusage(UsageWho::RUSAGE_SELF) else {
        return 0;
    };
    let max_rss = u64::try_from(usage.max_rss()).unwrap_or(0);

    cfg_if! {
        if #[cfg(any(target_os = "macos", target_os = "ios"))] {
            max_rss
        } else {
            // reported in kilobytes everywhere else
            max_rss.saturating_mul(1024)
        }
    }
}

/// Current resident set size in bytes, or 0 if unavailable.
pub fn current_rss() -> u64 {
    cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            statm_rss().unwrap_or(0)
        } else {
            // no portable query for the current value, the peak is the closest bound
            peak_rss()
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn statm_rss() -> Option<u64> {
    // /proc/self/statm: size resident shared text lib data dt, in pages
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(pages.saturating_mul(page_size()))
}

/// CPU time consumed by all threads of the process.
pub fn process_cpu_time() -> Duration {
    match clock_gettime(ClockId::CLOCK_PROCESS_CPUTIME_ID) {
        Ok(time) => Duration::from_nanos(u64::try_from(time.num_nanoseconds()).unwrap_or(0)),
        Err(_) => Duration::ZERO,
    }
}
