//! Property dictionary for objects without a fixed layout
//!
//! Open addressing over a power-of-two bucket array with triangular probing:
//! probe `i` visits `(hash + i*(i+1)/2) & mask`, which reaches every bucket
//! exactly once. Lookup and insertion walk the same sequence.
//!
//! A bucket is `Empty`, `Deleted` (tombstone) or `Occupied`. A probe stops
//! at the first `Empty` bucket; tombstones are skipped on lookup and reused
//! on insertion.
//!
//! Each entry is laid out as three consecutive logical slots:
//!
//! ```text
//! [ key | value | details ]   slot = index * ENTRY_SIZE + *_OFFSET
//! ```
//!
//! The slot numbers are what the write barrier sees for value stores.
//!
//! Structural changes (add, remove, rehash, renumber) bump the dictionary's
//! generation. An [`EntryIndex`] carries the generation it was computed
//! under and is rejected once stale, so an index that crossed a call into
//! user code cannot silently address the wrong entry.

use otter_vm_gc::{GcHeader, WriteBarrier, tags};

use crate::error::{VmError, VmResult};
use crate::property::{PropertyDetails, PropertyKey};
use crate::value::Value;

/// Logical slots per entry
pub const ENTRY_SIZE: usize = 3;
/// Key slot offset within an entry
pub const KEY_OFFSET: usize = 0;
/// Value slot offset within an entry
pub const VALUE_OFFSET: usize = 1;
/// Details slot offset within an entry
pub const DETAILS_OFFSET: usize = 2;

const MIN_CAPACITY: usize = 8;

/// One stored property
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    /// Property key
    pub key: PropertyKey,
    /// Stored value (an accessor pair for accessor properties)
    pub value: Value,
    /// Kind, attributes and enumeration index
    pub details: PropertyDetails,
}

#[derive(Debug, Clone)]
enum Bucket {
    Empty,
    Deleted,
    Occupied(DictionaryEntry),
}

/// Position of a found entry, valid for one dictionary generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryIndex {
    index: u32,
    generation: u32,
}

impl EntryIndex {
    /// Bucket index
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Generation the index was computed under
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Logical key slot
    #[inline]
    pub fn key_slot(self) -> usize {
        self.index() * ENTRY_SIZE + KEY_OFFSET
    }

    /// Logical value slot
    #[inline]
    pub fn value_slot(self) -> usize {
        self.index() * ENTRY_SIZE + VALUE_OFFSET
    }

    /// Logical details slot
    #[inline]
    pub fn details_slot(self) -> usize {
        self.index() * ENTRY_SIZE + DETAILS_OFFSET
    }
}

/// Probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryLookup {
    /// Key present at this index
    Found(EntryIndex),
    /// Key definitively absent
    NotFound,
}

/// Hash table from property keys to `(value, details)`
#[derive(Debug)]
pub struct PropertyDictionary {
    header: GcHeader,
    buckets: Vec<Bucket>,
    len: usize,
    deleted: usize,
    next_enumeration_index: u32,
    generation: u32,
}

impl PropertyDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a dictionary sized for `n` properties
    pub fn with_capacity(n: usize) -> Self {
        let capacity = Self::capacity_for(n);
        Self {
            header: GcHeader::new(tags::DICTIONARY),
            buckets: vec![Bucket::Empty; capacity],
            len: 0,
            deleted: 0,
            next_enumeration_index: 1,
            generation: 0,
        }
    }

    /// Smallest power of two keeping `n` entries under 2/3 load
    fn capacity_for(n: usize) -> usize {
        (n * 3 / 2 + 1).next_power_of_two().max(MIN_CAPACITY)
    }

    #[inline]
    fn probe(hash: u64, i: usize, mask: usize) -> usize {
        (hash as usize).wrapping_add(i * (i + 1) / 2) & mask
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the dictionary has no live entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of tombstones
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    /// Current generation
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// GC header of the dictionary cell
    pub fn header(&self) -> &GcHeader {
        &self.header
    }

    /// Find `key`. Read-only; never resizes.
    pub fn lookup(&self, key: &PropertyKey) -> DictionaryLookup {
        let mask = self.buckets.len() - 1;
        let hash = key.hash_value();
        for i in 0..self.buckets.len() {
            let index = Self::probe(hash, i, mask);
            match &self.buckets[index] {
                Bucket::Empty => return DictionaryLookup::NotFound,
                Bucket::Deleted => continue,
                Bucket::Occupied(entry) if entry.key == *key => {
                    return DictionaryLookup::Found(EntryIndex {
                        index: index as u32,
                        generation: self.generation,
                    });
                }
                Bucket::Occupied(_) => {}
            }
        }
        DictionaryLookup::NotFound
    }

    /// Entry at `index`
    pub fn entry_at(&self, index: EntryIndex) -> VmResult<&DictionaryEntry> {
        self.check_generation(index)?;
        match self.buckets.get(index.index()) {
            Some(Bucket::Occupied(entry)) => Ok(entry),
            _ => Err(VmError::internal(format!(
                "dictionary slot {} holds no entry",
                index.index()
            ))),
        }
    }

    /// Key at `index`
    pub fn key_at(&self, index: EntryIndex) -> VmResult<&PropertyKey> {
        Ok(&self.entry_at(index)?.key)
    }

    /// Value at `index`
    pub fn value_at(&self, index: EntryIndex) -> VmResult<Value> {
        Ok(self.entry_at(index)?.value.clone())
    }

    /// Details at `index`
    pub fn details_at(&self, index: EntryIndex) -> VmResult<PropertyDetails> {
        Ok(self.entry_at(index)?.details)
    }

    /// Overwrite the value slot at `index` and report the write
    pub fn set_value_at(
        &mut self,
        index: EntryIndex,
        value: Value,
        barrier: &dyn WriteBarrier,
    ) -> VmResult<()> {
        self.check_generation(index)?;
        let Some(Bucket::Occupied(entry)) = self.buckets.get_mut(index.index()) else {
            return Err(VmError::internal(format!(
                "dictionary slot {} holds no entry",
                index.index()
            )));
        };
        entry.value = value;
        barrier.record_write(&self.header, index.value_slot(), entry.value.heap_header());
        Ok(())
    }

    /// Replace kind and attributes at `index`, keeping the enumeration index
    pub fn set_details_at(&mut self, index: EntryIndex, details: PropertyDetails) -> VmResult<()> {
        self.check_generation(index)?;
        let Some(Bucket::Occupied(entry)) = self.buckets.get_mut(index.index()) else {
            return Err(VmError::internal(format!(
                "dictionary slot {} holds no entry",
                index.index()
            )));
        };
        entry.details = details.with_enumeration_index(entry.details.enumeration_index());
        Ok(())
    }

    fn check_generation(&self, index: EntryIndex) -> VmResult<()> {
        if index.generation == self.generation {
            Ok(())
        } else {
            Err(VmError::internal(format!(
                "stale dictionary index {} (generation {}, now {})",
                index.index(),
                index.generation,
                self.generation
            )))
        }
    }

    /// Add a new property. Fails if `key` is already present.
    ///
    /// May rehash; every previously returned [`EntryIndex`] becomes stale.
    pub fn add(
        &mut self,
        key: PropertyKey,
        value: Value,
        details: PropertyDetails,
        barrier: &dyn WriteBarrier,
    ) -> VmResult<EntryIndex> {
        if let DictionaryLookup::Found(_) = self.lookup(&key) {
            return Err(VmError::internal(format!("duplicate dictionary key '{key}'")));
        }
        if (self.len + self.deleted + 1) * 3 > self.buckets.len() * 2 {
            self.rehash(Self::capacity_for(self.len + 1));
        }
        if self.next_enumeration_index > PropertyDetails::MAX_ENUMERATION_INDEX {
            self.renumber();
        }

        let details = details.with_enumeration_index(self.next_enumeration_index);
        self.next_enumeration_index += 1;
        let index = self.insert_slot(&key);
        if matches!(self.buckets[index], Bucket::Deleted) {
            self.deleted -= 1;
        }
        self.buckets[index] = Bucket::Occupied(DictionaryEntry {
            key,
            value,
            details,
        });
        self.len += 1;
        self.generation = self.generation.wrapping_add(1);

        let index = EntryIndex {
            index: index as u32,
            generation: self.generation,
        };
        if let Bucket::Occupied(entry) = &self.buckets[index.index()] {
            barrier.record_write(&self.header, index.value_slot(), entry.value.heap_header());
        }
        Ok(index)
    }

    /// First tombstone or empty bucket on `key`'s probe path
    fn insert_slot(&self, key: &PropertyKey) -> usize {
        let mask = self.buckets.len() - 1;
        let hash = key.hash_value();
        let mut i = 0;
        loop {
            let index = Self::probe(hash, i, mask);
            match self.buckets[index] {
                Bucket::Empty | Bucket::Deleted => return index,
                Bucket::Occupied(_) => i += 1,
            }
        }
    }

    /// Remove `key`, leaving a tombstone
    pub fn remove(&mut self, key: &PropertyKey) -> Option<DictionaryEntry> {
        let DictionaryLookup::Found(index) = self.lookup(key) else {
            return None;
        };
        let removed = std::mem::replace(&mut self.buckets[index.index()], Bucket::Deleted);
        self.len -= 1;
        self.deleted += 1;
        self.generation = self.generation.wrapping_add(1);
        match removed {
            Bucket::Occupied(entry) => Some(entry),
            _ => None,
        }
    }

    fn rehash(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.buckets, vec![Bucket::Empty; capacity]);
        self.deleted = 0;
        for bucket in old {
            if let Bucket::Occupied(entry) = bucket {
                let index = self.insert_slot(&entry.key);
                self.buckets[index] = Bucket::Occupied(entry);
            }
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Compact enumeration indices to `1..=len`, preserving order
    fn renumber(&mut self) {
        let mut order: Vec<(u32, usize)> = self
            .buckets
            .iter()
            .enumerate()
            .filter_map(|(i, bucket)| match bucket {
                Bucket::Occupied(entry) => Some((entry.details.enumeration_index(), i)),
                _ => None,
            })
            .collect();
        order.sort_unstable();
        for (next, (_, i)) in order.into_iter().enumerate() {
            if let Bucket::Occupied(entry) = &mut self.buckets[i] {
                entry.details = entry.details.with_enumeration_index(next as u32 + 1);
            }
        }
        self.next_enumeration_index = self.len as u32 + 1;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Live entries in bucket order
    pub fn iter(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.buckets.iter().filter_map(|bucket| match bucket {
            Bucket::Occupied(entry) => Some(entry),
            _ => None,
        })
    }

    /// Live entries in creation order
    pub fn entries_in_order(&self) -> Vec<&DictionaryEntry> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by_key(|entry| entry.details.enumeration_index());
        entries
    }

    /// Find `key` and return its entry
    pub fn get(&self, key: &PropertyKey) -> Option<&DictionaryEntry> {
        match self.lookup(key) {
            DictionaryLookup::Found(index) => self.entry_at(index).ok(),
            DictionaryLookup::NotFound => None,
        }
    }
}

impl Default for PropertyDictionary {
    fn default() -> Self {
        Self::new()
    }
}
