//! Ring counters for observability.
//!
//! Counters are bumped while the ring lock is held, so a snapshot taken
//! under that same lock is consistent. Reading them without the lock is
//! fine for monitoring; individual loads may then straddle an operation.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RingDiagnostics {
    pub slots_written: AtomicU64,
    pub slots_read: AtomicU64,
    /// Non-blocking reads answered from the last-read cache.
    pub repeats_served: AtomicU64,
    pub overflow_resets: AtomicU64,
    /// Buffered slots discarded by overflow resets.
    pub slots_dropped: AtomicU64,
    pub underrun_resets: AtomicU64,
    /// Blocking reads that found the ring empty and had to wait.
    pub blocked_reads: AtomicU64,
}

impl RingDiagnostics {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.slots_written.store(0, Ordering::Relaxed);
        self.slots_read.store(0, Ordering::Relaxed);
        self.repeats_served.store(0, Ordering::Relaxed);
        self.overflow_resets.store(0, Ordering::Relaxed);
        self.slots_dropped.store(0, Ordering::Relaxed);
        self.underrun_resets.store(0, Ordering::Relaxed);
        self.blocked_reads.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            slots_written: self.slots_written.load(Ordering::Relaxed),
            slots_read: self.slots_read.load(Ordering::Relaxed),
            repeats_served: self.repeats_served.load(Ordering::Relaxed),
            overflow_resets: self.overflow_resets.load(Ordering::Relaxed),
            slots_dropped: self.slots_dropped.load(Ordering::Relaxed),
            underrun_resets: self.underrun_resets.load(Ordering::Relaxed),
            blocked_reads: self.blocked_reads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub slots_written: u64,
    pub slots_read: u64,
    pub repeats_served: u64,
    pub overflow_resets: u64,
    pub slots_dropped: u64,
    pub underrun_resets: u64,
    pub blocked_reads: u64,
}

impl DiagnosticsSnapshot {
    /// Slots written but neither read nor dropped, i.e. still buffered.
    pub fn in_flight(&self) -> u64 {
        self.slots_written
            .saturating_sub(self.slots_read)
            .saturating_sub(self.slots_dropped)
    }
}
