//! Fixed-slot ring buffer shared by one producer and one consumer thread.
//!
//! ## Layout
//!
//! ```text
//!            read                    write
//!              │                       │
//!   arena: [ s0 | s1 | s2 | s3 | s4 | s5 | s6 | s7 ]   (num_slots × slot_size bytes)
//!              └── occupancy = 4 ──────┘
//!
//!   last_read: [ slot_size bytes ]  ← most recently delivered slot
//! ```
//!
//! ## Clock drift
//!
//! The producer (network receive or capture) and the consumer (audio
//! output) run on independent clocks:
//!
//! - **Producer too fast** → the ring fills up. `write_slot` never waits;
//!   it resynchronizes via an overflow reset, dropping backlog according
//!   to the [`OverflowPolicy`], then stores the incoming slot.
//! - **Producer too slow** → the ring drains. `read_slot` waits on the
//!   "not empty" condition; `read_last_slot_non_blocking` repeats the
//!   last delivered slot instead of waiting.
//!
//! All state sits behind one `parking_lot::Mutex`. The two condition
//! variables share that mutex, and a thread only sleeps inside
//! `Condvar::wait`, which releases it.

pub mod handles;
pub mod stats;

use std::fmt;
use std::ops::Range;
use std::sync::atomic::Ordering;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::{
    config::{OverflowPolicy, RingConfig},
    error::{Result, SlotRingError},
};

pub use handles::{SlotConsumer, SlotProducer};
pub use stats::{DiagnosticsSnapshot, RingDiagnostics};

/// Where the bytes handed out by a non-blocking read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A newly buffered slot was consumed.
    Fresh,
    /// The ring was empty; the last delivered slot (or silence) was repeated.
    Repeated,
}

impl ReadOutcome {
    pub fn is_fresh(self) -> bool {
        self == ReadOutcome::Fresh
    }
}

/// Everything the mutex guards.
struct RingState {
    arena: Vec<u8>,
    last_read: Vec<u8>,
    slot_size: usize,
    num_slots: usize,
    /// Next slot to consume (tail).
    read_pos: usize,
    /// Next slot to fill (head).
    write_pos: usize,
    /// Slots holding unread data.
    full_slots: usize,
}

impl RingState {
    fn new(slot_size: usize, num_slots: usize) -> Self {
        Self {
            arena: vec![0; slot_size * num_slots],
            last_read: vec![0; slot_size],
            slot_size,
            num_slots,
            read_pos: 0,
            write_pos: 0,
            full_slots: 0,
        }
    }

    fn slot_range(&self, index: usize) -> Range<usize> {
        let start = index * self.slot_size;
        start..start + self.slot_size
    }

    /// Occupancy must equal the circular distance from read to write.
    fn is_consistent(&self) -> bool {
        self.read_pos < self.num_slots
            && self.write_pos < self.num_slots
            && self.full_slots <= self.num_slots
            && (self.read_pos + self.full_slots) % self.num_slots == self.write_pos
    }

    /// Caller guarantees a free slot.
    fn push(&mut self, data: &[u8]) {
        let range = self.slot_range(self.write_pos);
        self.arena[range].copy_from_slice(data);
        self.write_pos = (self.write_pos + 1) % self.num_slots;
        self.full_slots += 1;
    }

    /// Caller guarantees a full slot.
    fn pop_into(&mut self, out: &mut [u8]) {
        let range = self.slot_range(self.read_pos);
        out.copy_from_slice(&self.arena[range.clone()]);
        self.last_read.copy_from_slice(&self.arena[range]);
        self.read_pos = (self.read_pos + 1) % self.num_slots;
        self.full_slots -= 1;
    }

    /// Drop the oldest buffered slots so that only `retained` remain,
    /// moving the read cursor up behind them. Returns the number dropped.
    fn overflow_reset(&mut self, retained: usize) -> usize {
        let retained = retained.min(self.full_slots);
        let dropped = self.full_slots - retained;
        self.read_pos = (self.read_pos + dropped) % self.num_slots;
        self.full_slots = retained;
        dropped
    }

    /// Collapse to the empty state at the current write cursor.
    fn underrun_reset(&mut self) {
        self.write_pos %= self.num_slots;
        self.read_pos = self.write_pos;
        self.full_slots = 0;
    }
}

/// Bounded ring of `num_slots` byte slots, each exactly `slot_size` long.
///
/// `SlotRing` is `Send + Sync`; share it behind an `Arc`, or call
/// [`split`](SlotRing::split) to get one handle per role.
///
/// The contract is one writer thread and one reader thread. Nothing breaks
/// memory-wise with more, but ordering and the reset policies assume a
/// single producer and a single consumer.
pub struct SlotRing {
    slot_size: usize,
    num_slots: usize,
    policy: OverflowPolicy,
    state: Mutex<RingState>,
    /// Signalled after a slot is consumed.
    not_full: Condvar,
    /// Signalled after a slot is stored.
    not_empty: Condvar,
    diagnostics: RingDiagnostics,
}

impl SlotRing {
    /// Create a ring of `num_slots` slots of `slot_size` bytes each with
    /// the default overflow policy.
    ///
    /// # Errors
    /// - `SlotRingError::ZeroSlotSize` / `ZeroSlotCount` for empty dimensions.
    /// - `SlotRingError::ArenaTooLarge` if the arena would be unreasonably large.
    pub fn new(slot_size: usize, num_slots: usize) -> Result<Self> {
        Self::with_config(RingConfig::new(slot_size, num_slots))
    }

    pub fn with_config(config: RingConfig) -> Result<Self> {
        config.validate()?;

        debug!(
            slot_size = config.slot_size,
            num_slots = config.num_slots,
            policy = ?config.overflow_policy,
            "slot ring allocated"
        );

        Ok(Self {
            slot_size: config.slot_size,
            num_slots: config.num_slots,
            policy: config.overflow_policy,
            state: Mutex::new(RingState::new(config.slot_size, config.num_slots)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            diagnostics: RingDiagnostics::default(),
        })
    }

    /// Store one slot. Never waits.
    ///
    /// If the ring is full the backlog is resynchronized per the overflow
    /// policy first, so the write always lands and is visible to the next
    /// read.
    ///
    /// # Errors
    /// `SlotRingError::SlotSizeMismatch` if `data` is not exactly
    /// `slot_size` bytes. The ring is left untouched.
    pub fn write_slot(&self, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;

        let mut state = self.state.lock();
        self.resync_if_inconsistent(&mut state);
        if state.full_slots >= self.num_slots {
            let retained = self.policy.retained(self.num_slots);
            let dropped = state.overflow_reset(retained);
            RingDiagnostics::bump(&self.diagnostics.overflow_resets);
            self.diagnostics
                .slots_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            debug!(dropped, retained, "ring overflow: producer ahead, backlog resynchronized");
        }

        state.push(data);
        RingDiagnostics::bump(&self.diagnostics.slots_written);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Consume the oldest slot into `out`, waiting while the ring is empty.
    ///
    /// Only a later [`write_slot`](Self::write_slot) releases a waiting
    /// reader. Real-time callbacks should use
    /// [`read_last_slot_non_blocking`](Self::read_last_slot_non_blocking).
    ///
    /// # Errors
    /// `SlotRingError::SlotSizeMismatch` if `out` is not exactly `slot_size` bytes.
    pub fn read_slot(&self, out: &mut [u8]) -> Result<()> {
        self.check_len(out.len())?;

        let mut state = self.state.lock();
        let mut waited = false;
        loop {
            self.resync_if_inconsistent(&mut state);
            if state.full_slots > 0 {
                break;
            }
            if !waited {
                RingDiagnostics::bump(&self.diagnostics.blocked_reads);
                waited = true;
            }
            self.not_empty.wait(&mut state);
        }

        self.consume(state, out);
        Ok(())
    }

    /// Consume the oldest slot if there is one, otherwise repeat the last
    /// delivered slot. Never waits.
    ///
    /// Before anything has been read the repeated slot is all zeros.
    ///
    /// # Errors
    /// `SlotRingError::SlotSizeMismatch` if `out` is not exactly `slot_size` bytes.
    pub fn read_last_slot_non_blocking(&self, out: &mut [u8]) -> Result<ReadOutcome> {
        self.check_len(out.len())?;

        let mut state = self.state.lock();
        self.resync_if_inconsistent(&mut state);

        if state.full_slots > 0 {
            self.consume(state, out);
            return Ok(ReadOutcome::Fresh);
        }

        out.copy_from_slice(&state.last_read);
        RingDiagnostics::bump(&self.diagnostics.repeats_served);
        trace!("ring empty: repeating last slot");
        Ok(ReadOutcome::Repeated)
    }

    /// Hand out one producer and one consumer handle over a shared ring.
    pub fn split(self) -> (SlotProducer, SlotConsumer) {
        handles::split(self)
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn total_size(&self) -> usize {
        self.slot_size * self.num_slots
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Slots currently holding unread data.
    pub fn occupancy(&self) -> usize {
        self.state.lock().full_slots
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() == self.num_slots
    }

    /// Occupancy as a fraction of capacity, in [0.0, 1.0].
    pub fn fill_ratio(&self) -> f32 {
        self.occupancy() as f32 / self.num_slots as f32
    }

    pub fn diagnostics(&self) -> &RingDiagnostics {
        &self.diagnostics
    }

    /// Counter snapshot taken under the ring lock.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        let _state = self.state.lock();
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.slot_size {
            return Err(SlotRingError::SlotSizeMismatch {
                expected: self.slot_size,
                actual,
            });
        }
        Ok(())
    }

    /// Takes the guard by value so the lock is released before notifying.
    fn consume(&self, mut state: MutexGuard<'_, RingState>, out: &mut [u8]) {
        state.pop_into(out);
        RingDiagnostics::bump(&self.diagnostics.slots_read);
        drop(state);
        self.not_full.notify_one();
    }

    fn resync_if_inconsistent(&self, state: &mut RingState) {
        if state.is_consistent() {
            return;
        }
        warn!(
            read_pos = state.read_pos,
            write_pos = state.write_pos,
            full_slots = state.full_slots,
            "ring cursors inconsistent: underrun reset"
        );
        state.underrun_reset();
        RingDiagnostics::bump(&self.diagnostics.underrun_resets);
        // Wake any producer waiting for room.
        self.not_full.notify_one();
    }
}

impl fmt::Debug for SlotRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SlotRing")
            .field("slot_size", &self.slot_size)
            .field("num_slots", &self.num_slots)
            .field("policy", &self.policy)
            .field("read_pos", &state.read_pos)
            .field("write_pos", &state.write_pos)
            .field("full_slots", &state.full_slots)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn slot(value: u8, len: usize) -> Vec<u8> {
        vec![value; len]
    }

    fn read(ring: &SlotRing) -> Vec<u8> {
        let mut out = vec![0; ring.slot_size()];
        ring.read_slot(&mut out).unwrap();
        out
    }

    fn read_nb(ring: &SlotRing) -> (Vec<u8>, ReadOutcome) {
        let mut out = vec![0xAA; ring.slot_size()];
        let outcome = ring.read_last_slot_non_blocking(&mut out).unwrap();
        (out, outcome)
    }

    /// Test-only: scramble the guarded state to exercise the resync path.
    fn corrupt(ring: &SlotRing, f: impl FnOnce(&mut RingState)) {
        f(&mut *ring.state.lock());
    }

    #[test]
    fn construction_starts_empty_and_silent() {
        let ring = SlotRing::new(16, 4).unwrap();
        assert_eq!(ring.occupancy(), 0);
        assert!(ring.is_empty());
        assert_eq!(ring.total_size(), 64);

        let (out, outcome) = read_nb(&ring);
        assert_eq!(outcome, ReadOutcome::Repeated);
        assert_eq!(out, vec![0; 16]);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(SlotRing::new(0, 4), Err(SlotRingError::ZeroSlotSize)));
        assert!(matches!(SlotRing::new(4, 0), Err(SlotRingError::ZeroSlotCount)));
    }

    #[test]
    fn wrong_length_buffers_rejected_without_side_effects() {
        let ring = SlotRing::new(4, 2).unwrap();
        let err = ring.write_slot(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            SlotRingError::SlotSizeMismatch { expected: 4, actual: 3 }
        ));
        assert_eq!(ring.occupancy(), 0);

        ring.write_slot(&[1; 4]).unwrap();
        let mut short = [0u8; 2];
        assert!(ring.read_slot(&mut short).is_err());
        let mut long = [0u8; 8];
        assert!(ring.read_last_slot_non_blocking(&mut long).is_err());
        assert_eq!(ring.occupancy(), 1);
    }

    #[test]
    fn fifo_order_up_to_capacity() {
        let ring = SlotRing::new(3, 5).unwrap();
        for v in 1..=5 {
            ring.write_slot(&slot(v, 3)).unwrap();
        }
        assert!(ring.is_full());
        for v in 1..=5 {
            assert_eq!(read(&ring), slot(v, 3));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn fifo_order_across_wraparound() {
        let ring = SlotRing::new(2, 3).unwrap();
        let mut next_write = 0u8;
        let mut next_read = 0u8;
        for _ in 0..10 {
            ring.write_slot(&slot(next_write, 2)).unwrap();
            ring.write_slot(&slot(next_write + 1, 2)).unwrap();
            next_write += 2;
            assert_eq!(read(&ring), slot(next_read, 2));
            assert_eq!(read(&ring), slot(next_read + 1, 2));
            next_read += 2;
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn non_blocking_read_is_stable_without_writes() {
        let ring = SlotRing::new(4, 2).unwrap();
        ring.write_slot(&[9, 8, 7, 6]).unwrap();

        let (first, outcome) = read_nb(&ring);
        assert!(outcome.is_fresh());
        assert_eq!(first, vec![9, 8, 7, 6]);

        for _ in 0..5 {
            let (again, outcome) = read_nb(&ring);
            assert_eq!(outcome, ReadOutcome::Repeated);
            assert_eq!(again, first);
        }
        assert_eq!(ring.diagnostics_snapshot().repeats_served, 5);
    }

    #[test]
    fn blocking_read_updates_last_read_cache() {
        let ring = SlotRing::new(2, 2).unwrap();
        ring.write_slot(&[5, 5]).unwrap();
        assert_eq!(read(&ring), vec![5, 5]);

        let (out, outcome) = read_nb(&ring);
        assert_eq!(outcome, ReadOutcome::Repeated);
        assert_eq!(out, vec![5, 5]);
    }

    #[test]
    fn overflow_keeps_occupancy_bounded_and_newest_retrievable() {
        let ring = SlotRing::new(4, 3).unwrap();
        for v in 0..=3 {
            ring.write_slot(&slot(v, 4)).unwrap();
            assert!(ring.occupancy() <= 3);
        }
        assert_eq!(ring.occupancy(), 1);
        assert_eq!(read(&ring), slot(3, 4));

        let snap = ring.diagnostics_snapshot();
        assert_eq!(snap.overflow_resets, 1);
        assert_eq!(snap.slots_dropped, 3);
        assert_eq!(snap.slots_written, 4);
        assert_eq!(snap.in_flight(), 0);
    }

    #[test]
    fn sustained_overflow_never_grows() {
        let ring = SlotRing::new(8, 4).unwrap();
        for v in 0..100u8 {
            ring.write_slot(&slot(v, 8)).unwrap();
            assert!(ring.occupancy() <= 4);
        }
        // The newest slot is always the last one in the ring.
        let mut last = Vec::new();
        while !ring.is_empty() {
            last = read(&ring);
        }
        assert_eq!(last, slot(99, 8));
    }

    #[test]
    fn keep_newest_policy_preserves_recent_order() {
        let config = RingConfig::new(1, 6).half_full_margin();
        let ring = SlotRing::with_config(config).unwrap();
        for v in 0..6 {
            ring.write_slot(&[v]).unwrap();
        }
        // Full: 0..=5. Overflow keeps the newest 3 (3, 4, 5), then stores 6.
        ring.write_slot(&[6]).unwrap();
        assert_eq!(ring.occupancy(), 4);
        for expected in 3..=6 {
            assert_eq!(read(&ring), vec![expected]);
        }
        assert_eq!(ring.diagnostics_snapshot().slots_dropped, 3);
    }

    #[test]
    fn keep_newest_policy_is_clamped_to_leave_room() {
        let config =
            RingConfig::new(1, 3).with_overflow_policy(OverflowPolicy::KeepNewest { slots: 10 });
        let ring = SlotRing::with_config(config).unwrap();
        for v in 0..4 {
            ring.write_slot(&[v]).unwrap();
        }
        assert_eq!(ring.occupancy(), 3);
        for expected in 1..=3 {
            assert_eq!(read(&ring), vec![expected]);
        }
    }

    #[test]
    fn single_slot_ring_always_holds_newest() {
        let ring = SlotRing::new(2, 1).unwrap();
        ring.write_slot(&[1, 1]).unwrap();
        ring.write_slot(&[2, 2]).unwrap();
        assert_eq!(ring.occupancy(), 1);
        assert_eq!(read(&ring), vec![2, 2]);
        let (out, outcome) = read_nb(&ring);
        assert_eq!(outcome, ReadOutcome::Repeated);
        assert_eq!(out, vec![2, 2]);
    }

    #[test]
    fn four_byte_three_slot_walkthrough() {
        let ring = SlotRing::new(4, 3).unwrap();
        for v in 1..=3 {
            ring.write_slot(&slot(v, 4)).unwrap();
        }
        for v in 1..=3 {
            assert_eq!(read(&ring), slot(v, 4));
        }
        let (out, outcome) = read_nb(&ring);
        assert_eq!(outcome, ReadOutcome::Repeated);
        assert_eq!(out, slot(3, 4));

        for v in 4..=7 {
            ring.write_slot(&slot(v, 4)).unwrap();
            assert!(ring.occupancy() <= 3);
        }
        let (out, outcome) = read_nb(&ring);
        assert!(outcome.is_fresh());
        assert_eq!(out, slot(7, 4));
    }

    #[test]
    fn fill_ratio_tracks_occupancy() {
        let ring = SlotRing::new(1, 4).unwrap();
        assert_relative_eq!(ring.fill_ratio(), 0.0);
        ring.write_slot(&[1]).unwrap();
        ring.write_slot(&[2]).unwrap();
        assert_relative_eq!(ring.fill_ratio(), 0.5);
        ring.write_slot(&[3]).unwrap();
        ring.write_slot(&[4]).unwrap();
        assert_relative_eq!(ring.fill_ratio(), 1.0);
    }

    #[test]
    fn inconsistent_cursors_are_resynchronized_to_empty() {
        let ring = SlotRing::new(1, 4).unwrap();
        ring.write_slot(&[1]).unwrap();
        ring.write_slot(&[2]).unwrap();
        assert_eq!(read(&ring), vec![1]);

        corrupt(&ring, |s| s.full_slots = 3);
        let (out, outcome) = read_nb(&ring);
        assert_eq!(outcome, ReadOutcome::Repeated);
        assert_eq!(out, vec![1]);
        assert_eq!(ring.occupancy(), 0);
        assert_eq!(ring.diagnostics_snapshot().underrun_resets, 1);

        // The ring keeps working after the resync.
        ring.write_slot(&[7]).unwrap();
        assert_eq!(read(&ring), vec![7]);
    }

    #[test]
    fn out_of_range_cursor_is_resynchronized() {
        let ring = SlotRing::new(1, 2).unwrap();
        corrupt(&ring, |s| s.write_pos = 5);
        let (out, outcome) = read_nb(&ring);
        assert_eq!(outcome, ReadOutcome::Repeated);
        assert_eq!(ring.diagnostics_snapshot().underrun_resets, 1);
        assert_eq!(ring.occupancy(), 0);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn debug_output_omits_arena() {
        let ring = SlotRing::new(1024, 2).unwrap();
        let dbg = format!("{ring:?}");
        assert!(dbg.contains("num_slots: 2"), "{dbg}");
        assert!(dbg.len() < 256, "{dbg}");
    }
}
