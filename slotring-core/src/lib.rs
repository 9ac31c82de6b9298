//! # slotring
//!
//! Fixed-slot jitter ring buffer for real-time audio over the network.
//!
//! ## Architecture
//!
//! ```text
//! Network receive / capture ──write_slot──► SlotRing ──read_slot──────────────► consumer
//!        (producer clock)                    │   └──read_last_slot_non_blocking─► audio callback
//!                                            │
//!                                 overflow reset / last-slot repeat
//! ```
//!
//! The producer never waits: a full ring is resynchronized and the new slot
//! stored. The consumer either waits for data (`read_slot`) or repeats the
//! last slot it got (`read_last_slot_non_blocking`).
//!
//! ```rust
//! use slotring::{ReadOutcome, SlotRing};
//!
//! let ring = SlotRing::new(4, 3)?;
//! ring.write_slot(&[1, 1, 1, 1])?;
//!
//! let mut out = [0u8; 4];
//! ring.read_slot(&mut out)?;
//! assert_eq!(out, [1, 1, 1, 1]);
//!
//! // Nothing new: the last slot is repeated instead of blocking.
//! let outcome = ring.read_last_slot_non_blocking(&mut out)?;
//! assert_eq!(outcome, ReadOutcome::Repeated);
//! assert_eq!(out, [1, 1, 1, 1]);
//! # Ok::<(), slotring::SlotRingError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ring;

// Convenience re-exports for downstream crates
pub use config::{OverflowPolicy, RingConfig};
pub use error::SlotRingError;
pub use ring::{
    DiagnosticsSnapshot, ReadOutcome, RingDiagnostics, SlotConsumer, SlotProducer, SlotRing,
};
