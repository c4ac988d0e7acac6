//! Feedback errors

use crate::slot::{FeedbackSlot, FeedbackSlotKind};
use thiserror::Error;

/// Errors raised when a feedback slot is addressed incorrectly
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    /// Slot index is past the end of the vector
    #[error("feedback slot {slot} out of range (vector length {len})")]
    SlotOutOfRange {
        /// Requested slot
        slot: FeedbackSlot,
        /// Vector length
        len: usize,
    },

    /// Slot exists but was allocated for another access kind
    #[error("feedback slot {slot} is {actual:?}, expected {expected}")]
    KindMismatch {
        /// Requested slot
        slot: FeedbackSlot,
        /// Kind family the caller needs
        expected: &'static str,
        /// Kind the slot was allocated with
        actual: FeedbackSlotKind,
    },
}

/// Result type for feedback operations
pub type FeedbackResult<T> = std::result::Result<T, FeedbackError>;
