//! # Otter VM Heap Contract
//!
//! The slice of the garbage collector that the inline-cache layer talks to.
//!
//! ## Design
//!
//! - **Headers**: every heap cell carries a `GcHeader` with a tag, a stable id
//!   and a tri-color mark
//! - **Write barrier**: every store of a value into a heap cell is reported
//!   through the `WriteBarrier` trait, even when the collector ignores it

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod barrier;
pub mod object;

pub use barrier::{BarrierRecord, RememberedSet, WriteBarrier, WriteBarrierBuffer};
pub use object::{GcHeader, MarkColor, tags};
