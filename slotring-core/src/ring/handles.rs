//! One handle per role over a shared [`SlotRing`].
//!
//! Neither handle is `Clone`, so a split ring has exactly one writer and one
//! reader. Both are `Send` and are meant to be moved into their threads.

use std::sync::Arc;

use super::{ReadOutcome, SlotRing};
use crate::error::Result;

pub(super) fn split(ring: SlotRing) -> (SlotProducer, SlotConsumer) {
    let ring = Arc::new(ring);
    (
        SlotProducer {
            ring: Arc::clone(&ring),
        },
        SlotConsumer { ring },
    )
}

/// Writer half, held by the network-receive or capture thread.
#[derive(Debug)]
pub struct SlotProducer {
    ring: Arc<SlotRing>,
}

impl SlotProducer {
    /// See [`SlotRing::write_slot`]. Never waits.
    pub fn write_slot(&mut self, data: &[u8]) -> Result<()> {
        self.ring.write_slot(data)
    }

    /// Shared ring, for queries and diagnostics.
    pub fn ring(&self) -> &SlotRing {
        &self.ring
    }
}

/// Reader half, held by the audio-output thread.
#[derive(Debug)]
pub struct SlotConsumer {
    ring: Arc<SlotRing>,
}

impl SlotConsumer {
    /// See [`SlotRing::read_slot`]. May wait for the producer.
    pub fn read_slot(&mut self, out: &mut [u8]) -> Result<()> {
        self.ring.read_slot(out)
    }

    /// See [`SlotRing::read_last_slot_non_blocking`].
    pub fn read_last_slot_non_blocking(&mut self, out: &mut [u8]) -> Result<ReadOutcome> {
        self.ring.read_last_slot_non_blocking(out)
    }

    pub fn ring(&self) -> &SlotRing {
        &self.ring
    }
}
