//! GC object layout

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Source of cell ids. Ids are never reused within a process.
static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// GC object header
#[derive(Debug)]
pub struct GcHeader {
    /// Mark bits for tri-color marking
    mark: AtomicU8,
    /// Object type tag
    tag: u8,
    /// Stable identity of the cell
    id: u64,
}

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

impl GcHeader {
    /// Create new header with a fresh cell id
    pub fn new(tag: u8) -> Self {
        Self {
            mark: AtomicU8::new(MarkColor::White as u8),
            tag,
            id: NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Get mark color
    pub fn mark(&self) -> MarkColor {
        match self.mark.load(Ordering::Acquire) {
            0 => MarkColor::White,
            1 => MarkColor::Gray,
            _ => MarkColor::Black,
        }
    }

    /// Set mark color
    pub fn set_mark(&self, color: MarkColor) {
        self.mark.store(color as u8, Ordering::Release);
    }

    /// Get object tag
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Get the cell id
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Clone for GcHeader {
    fn clone(&self) -> Self {
        // A clone is a distinct cell: fresh id, White mark
        Self::new(self.tag)
    }
}

/// Object type tags
pub mod tags {
    /// String object
    pub const STRING: u8 = 1;
    /// Plain object
    pub const OBJECT: u8 = 3;
    /// Function object
    pub const FUNCTION: u8 = 4;
    /// Property dictionary backing store
    pub const DICTIONARY: u8 = 6;
    /// Accessor pair
    pub const ACCESSOR_PAIR: u8 = 7;
}
