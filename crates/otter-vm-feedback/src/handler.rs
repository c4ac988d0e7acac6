//! Cached access strategies

use serde::{Deserialize, Serialize};

/// Identity of an object shape (hidden class)
///
/// Ids are never reused, so a handler keyed by a dead shape simply never hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(pub u64);

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shape:{}", self.0)
    }
}

/// The strategy a call site caches for one observed shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handler {
    /// Read or write the fast-mode slot at `offset`
    FastField {
        /// Slot offset in the object's property vector
        offset: u32,
    },
    /// Look the key up in the receiver's property dictionary
    Dictionary,
    /// The property is an accessor; run the generic accessor logic
    AccessorForward,
    /// Add the property by moving the receiver to `target`, then write `offset`
    TransitionAndStore {
        /// Shape the receiver moves to
        target: ShapeId,
        /// Slot offset of the new property
        offset: u32,
    },
    /// No specialization applies; the generic runtime handles this shape
    Generic,
}
