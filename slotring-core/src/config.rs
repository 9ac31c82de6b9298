//! Ring configuration (geometry + overflow policy), optionally loaded from JSON.
//!
//! ```json
//! {
//!   "slotSize": 512,
//!   "numSlots": 16,
//!   "overflowPolicy": { "kind": "keepNewest", "slots": 8 }
//! }
//! ```
//!
//! Missing fields fall back to [`RingConfig::default`].

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SlotRingError};

/// Upper bound on `slot_size × num_slots`: 256 MiB.
pub const MAX_ARENA_BYTES: usize = 256 * 1024 * 1024;

/// What the writer does to the buffered slots when it finds the ring full.
///
/// The writer never blocks; it resynchronizes the cursors instead and then
/// stores the incoming slot. The policy decides how much of the backlog
/// survives that resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Drop every buffered slot. After the incoming write the ring holds
    /// exactly one slot, the newest.
    #[default]
    DiscardAll,
    /// Keep the newest `slots` buffered slots (clamped to `num_slots - 1`)
    /// and drop the older ones.
    KeepNewest { slots: usize },
}

impl OverflowPolicy {
    /// Number of buffered slots that survive an overflow reset on a ring
    /// with `num_slots` slots.
    pub fn retained(self, num_slots: usize) -> usize {
        match self {
            OverflowPolicy::DiscardAll => 0,
            OverflowPolicy::KeepNewest { slots } => slots.min(num_slots.saturating_sub(1)),
        }
    }
}

/// Construction parameters for a [`SlotRing`](crate::SlotRing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct RingConfig {
    /// Bytes per slot (one audio period or one network packet payload).
    pub slot_size: usize,
    /// Ring depth. More slots absorb more jitter at the cost of latency.
    pub num_slots: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            slot_size: 256,
            num_slots: 8,
            overflow_policy: OverflowPolicy::DiscardAll,
        }
    }
}

impl RingConfig {
    pub fn new(slot_size: usize, num_slots: usize) -> Self {
        Self {
            slot_size,
            num_slots,
            overflow_policy: OverflowPolicy::default(),
        }
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Overflow keeps the newest half of the ring, leaving the cursors
    /// `num_slots / 2` apart after a resync.
    pub fn half_full_margin(self) -> Self {
        let slots = self.num_slots / 2;
        self.with_overflow_policy(OverflowPolicy::KeepNewest { slots })
    }

    /// Arena size in bytes. Saturates instead of wrapping; [`validate`](Self::validate)
    /// rejects anything that large.
    pub fn total_size(&self) -> usize {
        self.slot_size.saturating_mul(self.num_slots)
    }

    /// Reject geometries the ring cannot be built with.
    ///
    /// # Errors
    /// - `ZeroSlotSize` / `ZeroSlotCount` for empty dimensions.
    /// - `ArenaTooLarge` if the arena would exceed [`MAX_ARENA_BYTES`].
    pub fn validate(&self) -> Result<()> {
        if self.slot_size == 0 {
            return Err(SlotRingError::ZeroSlotSize);
        }
        if self.num_slots == 0 {
            return Err(SlotRingError::ZeroSlotCount);
        }
        match self.slot_size.checked_mul(self.num_slots) {
            Some(total) if total <= MAX_ARENA_BYTES => Ok(()),
            _ => Err(SlotRingError::ArenaTooLarge {
                slot_size: self.slot_size,
                num_slots: self.num_slots,
            }),
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| SlotRingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. A missing file yields the defaults.
    ///
    /// # Errors
    /// IO failures other than "not found", malformed JSON, or a geometry
    /// that fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "ring config not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(anyhow::Error::from)?;
        fs::write(path, json)?;
        Ok(())
    }
}
