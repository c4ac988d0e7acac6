//! Garbage collection support
//!
//! Heap cells are reference counted; [`GcRef`] is the handle the rest of the
//! crate passes around. Identity comparisons go through [`GcRef::ptr_eq`].

use std::sync::Arc;

/// Handle to a GC-managed cell
pub struct GcRef<T>(Arc<T>);

impl<T> GcRef<T> {
    /// Allocate a new cell
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Do both handles point at the same cell
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Address of the cell, for identity checks against `&T`
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        Arc::as_ptr(&self.0)
    }
}

impl<T> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> std::ops::Deref for GcRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let a = GcRef::new(1u32);
        let b = a.clone();
        let c = GcRef::new(1u32);
        assert!(GcRef::ptr_eq(&a, &b));
        assert!(!GcRef::ptr_eq(&a, &c));
        assert_eq!(*a, *c);
    }
}
