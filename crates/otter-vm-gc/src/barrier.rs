//! Write barrier contract
//!
//! Every store of a value into a heap cell (an object slot, a dictionary value
//! slot) is reported to the memory manager through [`WriteBarrier`]. The
//! collector behind the trait decides what to do with it:
//! - Insertion barrier (Dijkstra-style): a white target stored into a black
//!   holder is shaded gray
//! - Remembered set: holders that received heap references are remembered as
//!   extra roots
//!
//! The notification is made for primitive values too; a barrier is free to
//! ignore writes whose `target` is `None`.

use crate::object::{GcHeader, MarkColor};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receiver of reference-write notifications
pub trait WriteBarrier: Send + Sync {
    /// Record that `holder` had its slot `slot` overwritten.
    ///
    /// `target` is the header of the stored value when it is a heap reference.
    fn record_write(&self, holder: &GcHeader, slot: usize, target: Option<&GcHeader>);
}

/// Dijkstra insertion step shared by the barrier implementations.
///
/// Returns true if the target was shaded.
#[inline]
fn shade_if_needed(holder: &GcHeader, target: Option<&GcHeader>) -> bool {
    match target {
        Some(to) if holder.mark() == MarkColor::Black && to.mark() == MarkColor::White => {
            to.set_mark(MarkColor::Gray);
            true
        }
        _ => false,
    }
}

/// One buffered barrier notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierRecord {
    /// Id of the cell that was written
    pub holder: u64,
    /// Tag of the cell that was written
    pub holder_tag: u8,
    /// Slot index within the holder
    pub slot: usize,
    /// Id of the stored heap reference, if any
    pub target: Option<u64>,
}

/// Write barrier buffer for batching barrier operations
///
/// Instead of processing each write barrier immediately, we buffer
/// them and process during GC.
pub struct WriteBarrierBuffer {
    /// Buffered notifications
    entries: Mutex<Vec<BarrierRecord>>,
    /// Maximum buffer size before flush
    max_size: usize,
    /// Number of times the buffer filled up
    overflows: AtomicUsize,
}

impl WriteBarrierBuffer {
    /// Create a new buffer with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new buffer with specific capacity
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(max_size.min(4096))),
            max_size: max_size.max(1),
            overflows: AtomicUsize::new(0),
        }
    }

    /// Add an entry to the buffer
    ///
    /// Returns true if buffer is full and should be flushed
    pub fn push(&self, record: BarrierRecord) -> bool {
        let mut entries = self.entries.lock();
        entries.push(record);
        entries.len() >= self.max_size
    }

    /// Take all entries from the buffer
    pub fn drain(&self) -> Vec<BarrierRecord> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Copy of the buffered entries, oldest first
    pub fn records(&self) -> Vec<BarrierRecord> {
        self.entries.lock().clone()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// How many times the buffer reached capacity and was flushed
    pub fn overflow_count(&self) -> usize {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl Default for WriteBarrierBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBarrier for WriteBarrierBuffer {
    fn record_write(&self, holder: &GcHeader, slot: usize, target: Option<&GcHeader>) {
        shade_if_needed(holder, target);
        let full = self.push(BarrierRecord {
            holder: holder.id(),
            holder_tag: holder.tag(),
            slot,
            target: target.map(GcHeader::id),
        });
        if full {
            // No collector drains us here, so flushing means dropping the batch
            #[cfg(feature = "gc_logging")]
            let dropped = self.drain().len();
            #[cfg(not(feature = "gc_logging"))]
            self.drain();
            self.overflows.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "gc_logging")]
            tracing::debug!(dropped, "write barrier buffer flushed");
        }
    }
}

/// Remembered set for tracking cells that received heap references
///
/// Records holders to serve as additional roots during collection.
pub struct RememberedSet {
    /// Ids of holders that stored a heap reference
    entries: Mutex<FxHashSet<u64>>,
}

impl RememberedSet {
    /// Create a new remembered set
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashSet::default()),
        }
    }

    /// Add an entry to the remembered set
    pub fn add(&self, id: u64) {
        self.entries.lock().insert(id);
    }

    /// Check if contains entry
    pub fn contains(&self, id: u64) -> bool {
        self.entries.lock().contains(&id)
    }

    /// Clear the set
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for RememberedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBarrier for RememberedSet {
    fn record_write(&self, holder: &GcHeader, _slot: usize, target: Option<&GcHeader>) {
        shade_if_needed(holder, target);
        if target.is_some() {
            self.add(holder.id());
        }
    }
}
