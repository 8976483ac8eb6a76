//! The Memory Monitor: soft/hard byte limits and pressure notification.
//!
//! JavaScriptCore's public C API exposes neither a GC epilogue callback nor
//! a heap-stats query, unlike the `OtterJscHeapStats`/`otter_jsc_heap_stats`
//! pair this module used to read (backed by a private fork's internal
//! accounting). Lacking both, usage is approximated by sampling process RSS:
//! after every job the Isolate Manager runs to completion, and — since a
//! long-running script blocks the owner thread between those samples — on a
//! short interval by a dedicated watchdog thread (see `isolate.rs`), which
//! is also the thread that requests execution termination the instant a
//! hard limit trips. This is documented as an accepted approximation, not a
//! bug: usage between samples is invisible, so `is_hard_reached()` reflects
//! the most recent sample rather than a precise trap.

use hostjs_core::EngineContext;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Default)]
pub struct HeapStats {
    pub used_bytes: u64,
}

/// Tracks soft/hard limits and the last-sampled usage. `0` disables a limit.
pub struct MemoryMonitor {
    soft_limit: AtomicU64,
    hard_limit: AtomicU64,
    last_sampled: AtomicU64,
    soft_reached: AtomicBool,
    hard_reached: AtomicBool,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self {
            soft_limit: AtomicU64::new(0),
            hard_limit: AtomicU64::new(0),
            last_sampled: AtomicU64::new(0),
            soft_reached: AtomicBool::new(false),
            hard_reached: AtomicBool::new(false),
        }
    }

    pub fn set_soft_limit(&self, bytes: u64) {
        self.soft_limit.store(bytes, Ordering::Relaxed);
    }

    pub fn set_hard_limit(&self, bytes: u64) {
        self.hard_limit.store(bytes, Ordering::Relaxed);
    }

    pub fn soft_limit(&self) -> u64 {
        self.soft_limit.load(Ordering::Relaxed)
    }

    pub fn hard_limit(&self) -> u64 {
        self.hard_limit.load(Ordering::Relaxed)
    }

    pub fn is_soft_reached(&self) -> bool {
        self.soft_reached.load(Ordering::Relaxed)
    }

    pub fn is_hard_reached(&self) -> bool {
        self.hard_reached.load(Ordering::Relaxed)
    }

    pub fn last_sampled_bytes(&self) -> u64 {
        self.last_sampled.load(Ordering::Relaxed)
    }

    /// Sample current usage and refresh the reached flags. Call from the
    /// owner thread after each completed task and once per RUN-state loop
    /// iteration.
    pub fn sample(&self) -> HeapStats {
        let used = read_rss_bytes().unwrap_or(0);
        self.last_sampled.store(used, Ordering::Relaxed);

        let soft = self.soft_limit.load(Ordering::Relaxed);
        self.soft_reached
            .store(soft != 0 && used >= soft, Ordering::Relaxed);

        let hard = self.hard_limit.load(Ordering::Relaxed);
        self.hard_reached
            .store(hard != 0 && used >= hard, Ordering::Relaxed);

        HeapStats { used_bytes: used }
    }

    /// Forward a moderate-pressure signal to the engine. JSC's public API
    /// has no distinct memory-pressure hint (unlike V8's
    /// `LowMemoryNotification`); a synchronous `JSGarbageCollect` is the
    /// closest available primitive.
    pub fn apply_low_memory_notification(&self, ctx: &EngineContext) {
        ctx.gc();
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn read_rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = 4096u64;
    Some(pages * page_size)
}

#[cfg(target_os = "macos")]
fn read_rss_bytes() -> Option<u64> {
    // No /proc on macOS; `task_info` requires bindgen-level Mach bindings
    // this crate doesn't carry. Usage sampling degrades to "unknown" (0),
    // which only ever suppresses the soft/hard flags, never falsely raises
    // them.
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn read_rss_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_limits_never_trip() {
        let mon = MemoryMonitor::new();
        mon.sample();
        assert!(!mon.is_soft_reached());
        assert!(!mon.is_hard_reached());
    }

    #[test]
    fn hard_limit_of_zero_bytes_trips_once_set_nonzero() {
        let mon = MemoryMonitor::new();
        mon.set_hard_limit(1);
        mon.sample();
        assert!(mon.is_hard_reached());
    }
}
