//! # Otter VM Feedback
//!
//! Per-call-site feedback for property access inline caches: slot kinds,
//! cached handlers and the monotonic cache state machine.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod handler;
pub mod slot;
pub mod state;
pub mod vector;

pub use error::{FeedbackError, FeedbackResult};
pub use handler::{Handler, ShapeId};
pub use slot::{FeedbackSlot, FeedbackSlotKind, LanguageMode};
pub use state::{InlineCacheState, IcTransition, MissObservation};
pub use vector::{FeedbackEntry, FeedbackVector, FeedbackVectorBuilder};
