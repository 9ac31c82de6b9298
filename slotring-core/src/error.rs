use thiserror::Error;

/// All errors produced by slotring.
///
/// Overflow and underrun are steady-state conditions handled inside the
/// ring and never show up here. Everything below is a caller contract
/// violation or a config/IO failure.
#[derive(Debug, Error)]
pub enum SlotRingError {
    #[error("slot size must be greater than 0")]
    ZeroSlotSize,

    #[error("slot count must be greater than 0")]
    ZeroSlotCount,

    #[error("arena of {num_slots} slots × {slot_size} bytes exceeds maximum safe size")]
    ArenaTooLarge { slot_size: usize, num_slots: usize },

    #[error("slot buffer is {actual} bytes, expected exactly {expected}")]
    SlotSizeMismatch { expected: usize, actual: usize },

    #[error("invalid ring config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SlotRingError>;
