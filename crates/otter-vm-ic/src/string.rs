//! Interned JavaScript strings
//!
//! Property-name strings are interned, so two keys are equal exactly when they
//! are the same allocation. Dictionary probes compare by pointer.

use dashmap::DashMap;
use otter_vm_gc::{GcHeader, tags};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Global string intern table
static STRING_TABLE: std::sync::LazyLock<DashMap<Arc<str>, Arc<JsString>>> =
    std::sync::LazyLock::new(DashMap::new);

/// An interned JavaScript string with GC support
pub struct JsString {
    /// GC header for garbage collection
    header: GcHeader,
    /// The actual string data
    data: Arc<str>,
    /// Precomputed hash for fast lookup
    hash: u64,
}

impl JsString {
    /// Create or retrieve an interned string
    pub fn intern(s: &str) -> Arc<Self> {
        if let Some(existing) = STRING_TABLE.get(s) {
            return existing.value().clone();
        }

        let data: Arc<str> = Arc::from(s);
        STRING_TABLE
            .entry(data.clone())
            .or_insert_with(|| {
                Arc::new(Self {
                    header: GcHeader::new(tags::STRING),
                    hash: Self::compute_hash(&data),
                    data,
                })
            })
            .value()
            .clone()
    }

    /// Compute the hash used by property dictionaries
    pub fn compute_hash(s: &str) -> u64 {
        let mut hasher = FxHasher::default();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Get the string contents
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Get the precomputed hash
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// GC header of the string cell
    pub fn header(&self) -> &GcHeader {
        &self.header
    }

    /// Parse as a canonical array index (`"0"`, `"17"`, never `"017"`)
    pub fn as_array_index(&self) -> Option<u32> {
        let s = self.as_str();
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // u32::MAX itself is not an array index
        s.parse::<u32>().ok().filter(|&i| i != u32::MAX)
    }

    /// Length in UTF-16 code units
    pub fn len_utf16(&self) -> usize {
        self.data.encode_utf16().count()
    }
}

impl std::fmt::Debug for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
