//! Hidden Classes (Shapes) for property access optimization.
//!
//! A Shape represents the structure of an object: what properties it has,
//! at what offsets they are stored and with which attributes. Shapes are
//! shared between objects with the same structure using a transition tree.
//!
//! Dictionary-mode objects get a shape of their own that is never shared
//! and has no transitions; its id only tells caches "this exact object".

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use otter_vm_feedback::ShapeId;

use crate::property::{PropertyDetails, PropertyKey};

/// Source of shape ids. Ids are never reused.
static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_shape_id() -> ShapeId {
    ShapeId(NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed))
}

/// A Shape defines the layout of properties in an object.
pub struct Shape {
    id: ShapeId,

    /// The parent shape from which this shape was transitioned.
    /// None for root and dictionary shapes.
    parent: Option<Arc<Shape>>,

    /// The property key that was added to the parent to create this shape.
    key: Option<PropertyKey>,

    /// The offset of the property in the object's property vector.
    offset: Option<usize>,

    /// Transitions to child shapes, keyed by added key and its details.
    /// Child -> Parent is strong, Parent -> Child is weak.
    transitions: Mutex<FxHashMap<(PropertyKey, u32), Weak<Shape>>>,

    /// All property offsets and details in this shape (inherited + own)
    property_map: FxHashMap<PropertyKey, (usize, PropertyDetails)>,

    /// Keys in insertion order
    keys_ordered: Vec<PropertyKey>,

    dictionary: bool,
}

impl Shape {
    fn empty(dictionary: bool) -> Arc<Self> {
        Arc::new(Self {
            id: next_shape_id(),
            parent: None,
            key: None,
            offset: None,
            transitions: Mutex::new(FxHashMap::default()),
            property_map: FxHashMap::default(),
            keys_ordered: Vec::new(),
            dictionary,
        })
    }

    /// Create a new root (empty) shape.
    pub fn root() -> Arc<Self> {
        Self::empty(false)
    }

    /// Create a fresh, unshared dictionary-mode shape.
    pub fn dictionary() -> Arc<Self> {
        Self::empty(true)
    }

    /// Unique id
    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Is this a dictionary-mode shape
    #[inline]
    pub fn is_dictionary(&self) -> bool {
        self.dictionary
    }

    /// Parent in the transition tree
    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    /// Key added by the transition into this shape
    pub fn key(&self) -> Option<&PropertyKey> {
        self.key.as_ref()
    }

    /// Offset of the key added by the transition into this shape
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Find a live transition for `key` with `details`
    pub fn find_transition(&self, key: &PropertyKey, details: PropertyDetails) -> Option<Arc<Self>> {
        let id = (key.clone(), details.without_enumeration_index().bits());
        self.transitions.lock().get(&id).and_then(Weak::upgrade)
    }

    /// Find a transition for a given key, or create a new one.
    ///
    /// Returns `None` for dictionary shapes, which never transition.
    pub fn transition(self: &Arc<Self>, key: PropertyKey, details: PropertyDetails) -> Option<Arc<Self>> {
        if self.dictionary {
            return None;
        }
        let details = details.without_enumeration_index();
        let mut transitions = self.transitions.lock();
        let id = (key.clone(), details.bits());
        if let Some(shape) = transitions.get(&id).and_then(Weak::upgrade) {
            return Some(shape);
        }

        let next_offset = self.keys_ordered.len();

        let mut next_property_map = self.property_map.clone();
        next_property_map.insert(key.clone(), (next_offset, details));

        let mut next_keys_ordered = self.keys_ordered.clone();
        next_keys_ordered.push(key.clone());

        let new_shape = Arc::new(Self {
            id: next_shape_id(),
            parent: Some(Arc::clone(self)),
            key: Some(key),
            offset: Some(next_offset),
            transitions: Mutex::new(FxHashMap::default()),
            property_map: next_property_map,
            keys_ordered: next_keys_ordered,
            dictionary: false,
        });

        transitions.insert(id, Arc::downgrade(&new_shape));
        Some(new_shape)
    }

    /// Offset and details of `key`
    pub fn lookup(&self, key: &PropertyKey) -> Option<(usize, PropertyDetails)> {
        self.property_map.get(key).copied()
    }

    /// Get the offset of a property key in this shape.
    pub fn get_offset(&self, key: &PropertyKey) -> Option<usize> {
        self.property_map.get(key).map(|(offset, _)| *offset)
    }

    /// All keys in insertion order
    pub fn keys(&self) -> &[PropertyKey] {
        &self.keys_ordered
    }

    /// Get the number of properties defined in this shape.
    pub fn property_count(&self) -> usize {
        self.keys_ordered.len()
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("offset", &self.offset)
            .field("property_count", &self.property_count())
            .field("dictionary", &self.dictionary)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyAttributes;

    fn data() -> PropertyDetails {
        PropertyDetails::data(PropertyAttributes::data())
    }

    #[test]
    fn test_transitions_are_shared() {
        let root = Shape::root();
        let a1 = root.transition(PropertyKey::string("a"), data()).unwrap();
        let a2 = root.transition(PropertyKey::string("a"), data()).unwrap();
        assert_eq!(a1.id(), a2.id());
        assert_eq!(a1.get_offset(&PropertyKey::string("a")), Some(0));

        let ab = a1.transition(PropertyKey::string("b"), data()).unwrap();
        assert_eq!(ab.lookup(&PropertyKey::string("b")).map(|(o, _)| o), Some(1));
        assert_eq!(ab.keys().len(), 2);
    }

    #[test]
    fn test_attributes_select_distinct_transitions() {
        let root = Shape::root();
        let writable = root.transition(PropertyKey::string("a"), data()).unwrap();
        let read_only = root
            .transition(
                PropertyKey::string("a"),
                PropertyDetails::data(PropertyAttributes::read_only()),
            )
            .unwrap();
        assert_ne!(writable.id(), read_only.id());
    }

    #[test]
    fn test_dead_transition_is_not_found() {
        let root = Shape::root();
        let key = PropertyKey::string("gone");
        let id = root.transition(key.clone(), data()).map(|s| s.id());
        assert!(id.is_some());
        assert!(root.find_transition(&key, data()).is_none());
    }

    #[test]
    fn test_dictionary_shapes_are_unique() {
        let a = Shape::dictionary();
        let b = Shape::dictionary();
        assert_ne!(a.id(), b.id());
        assert!(a.transition(PropertyKey::string("x"), data()).is_none());
    }
}
