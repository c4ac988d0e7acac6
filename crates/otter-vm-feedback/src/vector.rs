//! Feedback vector: one entry per property-access site of a function

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{FeedbackError, FeedbackResult};
use crate::handler::{Handler, ShapeId};
use crate::slot::{FeedbackSlot, FeedbackSlotKind, LanguageMode};
use crate::state::{IcTransition, InlineCacheState, MissObservation};

/// Metadata for a single IC slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// Access kind the slot was allocated for
    pub kind: FeedbackSlotKind,
    /// Inline cache state for property access
    pub ic_state: InlineCacheState,
    /// Hit count for this IC site
    pub hit_count: u32,
    /// Miss count for this IC site
    pub miss_count: u32,
    /// Prototype epoch the cached handlers were computed under
    pub proto_epoch: u64,
    /// Identity of the key a keyed site has been specialized for
    pub key: Option<u64>,
}

impl FeedbackEntry {
    /// Create a new uninitialized entry
    pub fn new(kind: FeedbackSlotKind) -> Self {
        Self {
            kind,
            ic_state: InlineCacheState::Uninitialized,
            hit_count: 0,
            miss_count: 0,
            proto_epoch: 0,
            key: None,
        }
    }

    /// Record a cache hit
    #[inline]
    pub fn record_hit(&mut self) {
        self.hit_count = self.hit_count.saturating_add(1);
    }

    /// Whether the cached handlers are valid under `epoch`
    #[inline]
    pub fn proto_epoch_matches(&self, epoch: u64) -> bool {
        self.proto_epoch == epoch
    }
}

/// Feedback vector for Inline Caches (mutable at runtime)
#[derive(Debug, Default)]
pub struct FeedbackVector {
    entries: RwLock<Vec<FeedbackEntry>>,
}

impl FeedbackVector {
    /// Create a vector with one slot per kind, in order
    pub fn new(kinds: impl IntoIterator<Item = FeedbackSlotKind>) -> Self {
        Self {
            entries: RwLock::new(kinds.into_iter().map(FeedbackEntry::new).collect()),
        }
    }

    /// Create a new builder
    pub fn builder() -> FeedbackVectorBuilder {
        FeedbackVectorBuilder::default()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the vector has no slots
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn with_entry<R>(
        &self,
        slot: FeedbackSlot,
        f: impl FnOnce(&FeedbackEntry) -> R,
    ) -> FeedbackResult<R> {
        let entries = self.entries.read();
        let len = entries.len();
        entries
            .get(slot.index())
            .map(f)
            .ok_or(FeedbackError::SlotOutOfRange { slot, len })
    }

    fn with_entry_mut<R>(
        &self,
        slot: FeedbackSlot,
        f: impl FnOnce(&mut FeedbackEntry) -> R,
    ) -> FeedbackResult<R> {
        let mut entries = self.entries.write();
        let len = entries.len();
        entries
            .get_mut(slot.index())
            .map(f)
            .ok_or(FeedbackError::SlotOutOfRange { slot, len })
    }

    /// Copy of the entry for `slot`
    pub fn entry(&self, slot: FeedbackSlot) -> FeedbackResult<FeedbackEntry> {
        self.with_entry(slot, FeedbackEntry::clone)
    }

    /// Slot kind
    pub fn kind(&self, slot: FeedbackSlot) -> FeedbackResult<FeedbackSlotKind> {
        self.with_entry(slot, |e| e.kind)
    }

    /// Current IC state of `slot`
    pub fn state(&self, slot: FeedbackSlot) -> FeedbackResult<InlineCacheState> {
        self.with_entry(slot, |e| e.ic_state.clone())
    }

    /// Check that `slot` is a load slot
    pub fn expect_load(&self, slot: FeedbackSlot) -> FeedbackResult<FeedbackSlotKind> {
        let kind = self.kind(slot)?;
        if kind.is_load() {
            Ok(kind)
        } else {
            Err(FeedbackError::KindMismatch {
                slot,
                expected: "load",
                actual: kind,
            })
        }
    }

    /// Check that `slot` is a store slot and return its language mode
    pub fn expect_store(&self, slot: FeedbackSlot) -> FeedbackResult<LanguageMode> {
        let kind = self.kind(slot)?;
        kind.language_mode().ok_or(FeedbackError::KindMismatch {
            slot,
            expected: "store",
            actual: kind,
        })
    }

    /// Handler cached for `shape`, counting a hit when found.
    ///
    /// Entries installed under another prototype epoch never hit.
    pub fn lookup(
        &self,
        slot: FeedbackSlot,
        shape: ShapeId,
        proto_epoch: u64,
    ) -> FeedbackResult<Option<Handler>> {
        self.with_entry_mut(slot, |e| {
            if !e.proto_epoch_matches(proto_epoch) {
                return None;
            }
            let handler = e.ic_state.lookup(shape)?;
            e.record_hit();
            e.ic_state.promote(shape);
            Some(handler)
        })
    }

    /// Feed a miss into the slot's state machine
    pub fn record_miss(
        &self,
        slot: FeedbackSlot,
        observation: MissObservation,
        capacity: usize,
        proto_epoch: u64,
    ) -> FeedbackResult<IcTransition> {
        self.with_entry_mut(slot, |e| {
            e.miss_count = e.miss_count.saturating_add(1);
            let transition = if e.proto_epoch_matches(proto_epoch) {
                e.ic_state.on_miss(observation, capacity)
            } else {
                e.ic_state.on_stale_miss(observation, capacity)
            };
            e.proto_epoch = proto_epoch;
            transition
        })
    }

    /// Handler cached for `shape` at a keyed site, valid only for `key`
    pub fn lookup_keyed(
        &self,
        slot: FeedbackSlot,
        key: u64,
        shape: ShapeId,
        proto_epoch: u64,
    ) -> FeedbackResult<Option<Handler>> {
        if self.with_entry(slot, |e| e.key != Some(key))? {
            return Ok(None);
        }
        self.lookup(slot, shape, proto_epoch)
    }

    /// Feed a miss into a keyed slot.
    ///
    /// A keyed site caches for a single key; seeing a second key gives up on
    /// per-shape caching.
    pub fn record_keyed_miss(
        &self,
        slot: FeedbackSlot,
        key: u64,
        observation: MissObservation,
        capacity: usize,
        proto_epoch: u64,
    ) -> FeedbackResult<IcTransition> {
        let key_changed = self.with_entry_mut(slot, |e| match e.key {
            Some(cached) if cached != key => true,
            _ => {
                e.key = Some(key);
                false
            }
        })?;
        if key_changed && observation.shape.is_some() {
            return self.with_entry_mut(slot, |e| {
                e.miss_count = e.miss_count.saturating_add(1);
                e.ic_state.saturate()
            });
        }
        self.record_miss(slot, observation, capacity, proto_epoch)
    }

    /// Reset a slot to `Uninitialized` (deoptimization)
    pub fn reset(&self, slot: FeedbackSlot) -> FeedbackResult<()> {
        self.with_entry_mut(slot, |e| {
            e.ic_state.reset();
            e.proto_epoch = 0;
            e.key = None;
        })
    }

    /// Copy of every entry, in slot order
    pub fn snapshot(&self) -> Vec<FeedbackEntry> {
        self.entries.read().clone()
    }
}

/// Builder for feedback vectors
#[derive(Debug, Default)]
pub struct FeedbackVectorBuilder {
    kinds: Vec<FeedbackSlotKind>,
}

impl FeedbackVectorBuilder {
    /// Append a slot, returning its id through `out`
    pub fn slot(mut self, kind: FeedbackSlotKind, out: &mut FeedbackSlot) -> Self {
        *out = FeedbackSlot(self.kinds.len() as u32);
        self.kinds.push(kind);
        self
    }

    /// Append a slot
    pub fn add(mut self, kind: FeedbackSlotKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Build the vector
    pub fn build(self) -> FeedbackVector {
        FeedbackVector::new(self.kinds)
    }
}
