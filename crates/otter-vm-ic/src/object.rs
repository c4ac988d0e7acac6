//! JavaScript objects with hidden classes (shapes)
//!
//! Objects start in fast mode: a [`Shape`] maps keys to offsets in a slot
//! vector. They move to dictionary mode (a [`PropertyDictionary`] plus a
//! private shape) when they grow past [`MAX_FAST_PROPERTIES`], lose a
//! property, or have a property reconfigured.
//!
//! Every root shape belongs to one prototype, so equal shapes imply equal
//! prototypes. Changes that could make a cached lookup through a prototype
//! wrong bump the global prototype epoch instead of walking caches.
//!
//! Locks are never held across calls into user code: methods here copy what
//! they found and release the lock before returning.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};

use otter_vm_feedback::ShapeId;
use otter_vm_gc::{GcHeader, WriteBarrier, tags};

use crate::accessor::AccessorPair;
use crate::dictionary::{DictionaryLookup, EntryIndex, PropertyDictionary};
use crate::error::{VmError, VmResult};
use crate::function::JsFunction;
use crate::gc::GcRef;
use crate::property::{PropertyAttributes, PropertyDetails, PropertyKey};
use crate::shape::Shape;
use crate::value::Value;

/// Fast-mode objects with more own properties are normalized
pub const MAX_FAST_PROPERTIES: usize = 32;

static PROTO_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Root shape for objects whose prototype is `null`
static NULL_PROTO_ROOT: LazyLock<Arc<Shape>> = LazyLock::new(Shape::root);

/// Current prototype epoch
#[inline]
pub fn proto_epoch() -> u64 {
    PROTO_EPOCH.load(Ordering::Acquire)
}

fn bump_proto_epoch() {
    let epoch = PROTO_EPOCH.fetch_add(1, Ordering::AcqRel) + 1;
    tracing::trace!(epoch, "prototype epoch bumped");
}

enum PropertyStorage {
    Fast(Vec<Value>),
    Dictionary(PropertyDictionary),
}

struct ObjectLayout {
    shape: Arc<Shape>,
    storage: PropertyStorage,
}

/// Where an own property lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyLocation {
    /// Fast-mode slot offset
    Field(usize),
    /// Dictionary entry
    Dictionary(EntryIndex),
}

/// Result of an own-property lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnProperty {
    /// Storage location
    pub location: PropertyLocation,
    /// Kind and attributes
    pub details: PropertyDetails,
}

/// Outcome of [`JsObject::write_own_data`]
#[derive(Debug, Clone)]
pub enum OwnWrite {
    /// The value slot was overwritten
    Written,
    /// The property exists but is read-only
    ReadOnly,
    /// The property is an accessor; the caller runs the setter
    Accessor(GcRef<AccessorPair>),
    /// No own property with that key
    Absent,
}

/// Proxy traps. A proxy has no properties of its own.
#[derive(Clone)]
pub struct ProxyTraps {
    /// Proxied object
    pub target: GcRef<JsObject>,
    /// `get(target, key, receiver)`
    pub get: Option<GcRef<JsFunction>>,
    /// `set(target, key, value, receiver)`
    pub set: Option<GcRef<JsFunction>>,
}

/// A JavaScript object
///
/// Thread-safe with interior mutability.
pub struct JsObject {
    header: GcHeader,
    layout: RwLock<ObjectLayout>,
    prototype: RwLock<Option<GcRef<JsObject>>>,
    extensible: AtomicBool,
    /// Set once another object uses this one as its prototype
    is_prototype: AtomicBool,
    /// Root shape for objects that have this object as prototype
    child_root: OnceLock<Arc<Shape>>,
    proxy: Option<ProxyTraps>,
    barrier: Arc<dyn WriteBarrier>,
}

impl JsObject {
    /// Create a new empty object
    pub fn new(prototype: Option<GcRef<JsObject>>, barrier: Arc<dyn WriteBarrier>) -> Self {
        let shape = match &prototype {
            Some(proto) => proto.root_shape_for_children(),
            None => Arc::clone(&NULL_PROTO_ROOT),
        };
        Self {
            header: GcHeader::new(tags::OBJECT),
            layout: RwLock::new(ObjectLayout {
                shape,
                storage: PropertyStorage::Fast(Vec::new()),
            }),
            prototype: RwLock::new(prototype),
            extensible: AtomicBool::new(true),
            is_prototype: AtomicBool::new(false),
            child_root: OnceLock::new(),
            proxy: None,
            barrier,
        }
    }

    /// Create a proxy for `traps.target`
    pub fn new_proxy(traps: ProxyTraps, barrier: Arc<dyn WriteBarrier>) -> Self {
        let mut obj = Self::new(None, barrier);
        obj.proxy = Some(traps);
        obj
    }

    fn root_shape_for_children(&self) -> Arc<Shape> {
        self.is_prototype.store(true, Ordering::Release);
        Arc::clone(self.child_root.get_or_init(Shape::root))
    }

    fn layout_changed(&self) {
        if self.is_prototype.load(Ordering::Acquire) {
            bump_proto_epoch();
        }
    }

    /// GC header of the object cell
    pub fn header(&self) -> &GcHeader {
        &self.header
    }

    /// Write barrier this object reports stores to
    pub fn barrier(&self) -> &Arc<dyn WriteBarrier> {
        &self.barrier
    }

    /// Current shape
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(&self.layout.read().shape)
    }

    /// Shape id for inline caches; `None` for proxies, which are never cached
    pub fn shape_id(&self) -> Option<ShapeId> {
        if self.proxy.is_some() {
            return None;
        }
        Some(self.layout.read().shape.id())
    }

    /// Is the object in dictionary mode
    pub fn is_dictionary_mode(&self) -> bool {
        matches!(self.layout.read().storage, PropertyStorage::Dictionary(_))
    }

    /// Proxy traps, if this is a proxy
    pub fn proxy_traps(&self) -> Option<&ProxyTraps> {
        self.proxy.as_ref()
    }

    /// Is this a proxy
    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Get prototype
    pub fn prototype(&self) -> Option<GcRef<JsObject>> {
        self.prototype.read().clone()
    }

    /// Next object a property lookup visits: a proxy forwards to its
    /// target, anything else to its prototype
    pub fn lookup_parent(&self) -> Option<GcRef<JsObject>> {
        match &self.proxy {
            Some(traps) => Some(traps.target.clone()),
            None => self.prototype(),
        }
    }

    /// Is extensible
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// Forbid adding properties
    pub fn prevent_extensions(&self) {
        if self.extensible.swap(false, Ordering::AcqRel) {
            self.layout_changed();
        }
    }

    /// Locate an own property
    pub fn lookup_own(&self, key: &PropertyKey) -> Option<OwnProperty> {
        let layout = self.layout.read();
        match &layout.storage {
            PropertyStorage::Fast(_) => layout.shape.lookup(key).map(|(offset, details)| OwnProperty {
                location: PropertyLocation::Field(offset),
                details,
            }),
            PropertyStorage::Dictionary(dict) => match dict.lookup(key) {
                DictionaryLookup::Found(index) => dict.details_at(index).ok().map(|details| OwnProperty {
                    location: PropertyLocation::Dictionary(index),
                    details,
                }),
                DictionaryLookup::NotFound => None,
            },
        }
    }

    /// Raw own property: stored value (accessor pairs unresolved) and details
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<(Value, PropertyDetails)> {
        let layout = self.layout.read();
        match &layout.storage {
            PropertyStorage::Fast(slots) => {
                let (offset, details) = layout.shape.lookup(key)?;
                slots.get(offset).map(|value| (value.clone(), details))
            }
            PropertyStorage::Dictionary(dict) => dict.get(key).map(|entry| (entry.value.clone(), entry.details)),
        }
    }

    /// Has an own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.lookup_own(key).is_some()
    }

    /// Read fast slot `offset` if the object still has shape `expected`
    pub fn read_field(&self, expected: ShapeId, offset: usize) -> Option<Value> {
        let layout = self.layout.read();
        if layout.shape.id() != expected {
            return None;
        }
        match &layout.storage {
            PropertyStorage::Fast(slots) => slots.get(offset).cloned(),
            PropertyStorage::Dictionary(_) => None,
        }
    }

    /// Overwrite fast slot `offset` if the object still has shape `expected`
    pub fn write_field(&self, expected: ShapeId, offset: usize, value: Value) -> bool {
        let mut layout = self.layout.write();
        if layout.shape.id() != expected {
            return false;
        }
        let PropertyStorage::Fast(slots) = &mut layout.storage else {
            return false;
        };
        let Some(slot) = slots.get_mut(offset) else {
            return false;
        };
        *slot = value;
        self.barrier.record_write(&self.header, offset, slot.heap_header());
        true
    }

    /// Add `key` by moving from shape `expected` to `target`.
    ///
    /// Applies only if the object still has shape `expected`, is extensible,
    /// and `expected` still has a live transition for `key` whose id is
    /// `target`.
    pub fn transition_and_store(
        &self,
        expected: ShapeId,
        key: &PropertyKey,
        target: ShapeId,
        value: Value,
    ) -> bool {
        let mut layout = self.layout.write();
        if layout.shape.id() != expected || !self.is_extensible() {
            return false;
        }
        let details = PropertyDetails::data(PropertyAttributes::data());
        let Some(next) = layout.shape.find_transition(key, details) else {
            return false;
        };
        if next.id() != target {
            return false;
        }
        let ObjectLayout { shape, storage } = &mut *layout;
        let PropertyStorage::Fast(slots) = storage else {
            return false;
        };
        if next.offset() != Some(slots.len()) {
            return false;
        }
        slots.push(value);
        let offset = slots.len() - 1;
        self.barrier.record_write(&self.header, offset, slots[offset].heap_header());
        *shape = next;
        drop(layout);
        self.layout_changed();
        true
    }

    /// Run `f` on the property dictionary; `None` in fast mode
    pub fn with_dictionary<R>(&self, f: impl FnOnce(&PropertyDictionary) -> R) -> Option<R> {
        let layout = self.layout.read();
        match &layout.storage {
            PropertyStorage::Dictionary(dict) => Some(f(dict)),
            PropertyStorage::Fast(_) => None,
        }
    }

    /// Run `f` on the property dictionary with this object's write barrier;
    /// `None` in fast mode
    pub fn with_dictionary_mut<R>(
        &self,
        f: impl FnOnce(&mut PropertyDictionary, &dyn WriteBarrier) -> R,
    ) -> Option<R> {
        let mut layout = self.layout.write();
        match &mut layout.storage {
            PropertyStorage::Dictionary(dict) => Some(f(dict, self.barrier.as_ref())),
            PropertyStorage::Fast(_) => None,
        }
    }

    /// Overwrite an existing own data property if it is writable
    pub fn write_own_data(&self, key: &PropertyKey, value: Value) -> VmResult<OwnWrite> {
        let mut layout = self.layout.write();
        let ObjectLayout { shape, storage } = &mut *layout;
        match storage {
            PropertyStorage::Fast(slots) => {
                let Some((offset, details)) = shape.lookup(key) else {
                    return Ok(OwnWrite::Absent);
                };
                if details.is_accessor() {
                    return Ok(accessor_write(&slots[offset]));
                }
                if details.is_read_only() {
                    return Ok(OwnWrite::ReadOnly);
                }
                slots[offset] = value;
                self.barrier.record_write(&self.header, offset, slots[offset].heap_header());
                Ok(OwnWrite::Written)
            }
            PropertyStorage::Dictionary(dict) => {
                let DictionaryLookup::Found(index) = dict.lookup(key) else {
                    return Ok(OwnWrite::Absent);
                };
                let details = dict.details_at(index)?;
                if details.is_accessor() {
                    return Ok(accessor_write(&dict.value_at(index)?));
                }
                if details.is_read_only() {
                    return Ok(OwnWrite::ReadOnly);
                }
                dict.set_value_at(index, value, self.barrier.as_ref())?;
                Ok(OwnWrite::Written)
            }
        }
    }

    /// Add a new own data property with default attributes.
    ///
    /// Returns false if the object is not extensible or already has `key`.
    pub fn add_data_property(&self, key: PropertyKey, value: Value) -> VmResult<bool> {
        if !self.is_extensible() || self.has_own(&key) {
            return Ok(false);
        }
        self.insert_new(key, value, PropertyDetails::data(PropertyAttributes::data()))?;
        Ok(true)
    }

    /// Create or redefine a data property.
    ///
    /// Redefining with different attributes normalizes a fast-mode object.
    /// Returns false if `key` is new and the object is not extensible, or if
    /// the existing property is not configurable and the definition would
    /// change it.
    pub fn define_property(
        &self,
        key: PropertyKey,
        value: Value,
        attributes: PropertyAttributes,
    ) -> VmResult<bool> {
        self.define(key, value, PropertyDetails::data(attributes))
    }

    /// Create or redefine an accessor property
    pub fn define_accessor(
        &self,
        key: PropertyKey,
        getter: Option<GcRef<JsFunction>>,
        setter: Option<GcRef<JsFunction>>,
        attributes: PropertyAttributes,
    ) -> VmResult<bool> {
        let pair = AccessorPair::new(getter, setter);
        self.define(key, Value::AccessorPair(pair), PropertyDetails::accessor(attributes))
    }

    fn define(&self, key: PropertyKey, value: Value, details: PropertyDetails) -> VmResult<bool> {
        let Some(existing) = self.lookup_own(&key) else {
            if !self.is_extensible() {
                return Ok(false);
            }
            self.insert_new(key, value, details)?;
            return Ok(true);
        };

        let old = existing.details.without_enumeration_index();
        let unchanged = old == details;
        if !old.is_configurable() {
            // Only writable -> read-only is allowed on a non-configurable data property
            let compatible = !old.is_accessor()
                && !details.is_accessor()
                && old.is_enumerable() == details.is_enumerable()
                && !details.is_configurable()
                && (!old.is_read_only() || details.is_read_only());
            if !compatible {
                return Ok(false);
            }
            if old.is_read_only()
                && let Some((current, _)) = self.get_own_property(&key)
                && current != value
            {
                return Ok(false);
            }
        }

        if !unchanged {
            self.normalize()?;
        }
        let mut layout = self.layout.write();
        let ObjectLayout { shape, storage } = &mut *layout;
        match storage {
            PropertyStorage::Fast(slots) => {
                let Some(offset) = shape.get_offset(&key) else {
                    return Ok(false);
                };
                slots[offset] = value;
                self.barrier.record_write(&self.header, offset, slots[offset].heap_header());
            }
            PropertyStorage::Dictionary(dict) => {
                let DictionaryLookup::Found(index) = dict.lookup(&key) else {
                    return Ok(false);
                };
                dict.set_details_at(index, details)?;
                dict.set_value_at(index, value, self.barrier.as_ref())?;
            }
        }
        drop(layout);
        if !unchanged {
            self.layout_changed();
        }
        Ok(true)
    }

    /// Insert a key known to be absent
    fn insert_new(&self, key: PropertyKey, value: Value, details: PropertyDetails) -> VmResult<()> {
        let needs_dictionary = {
            let layout = self.layout.read();
            matches!(layout.storage, PropertyStorage::Fast(_))
                && layout.shape.property_count() >= MAX_FAST_PROPERTIES
        };
        if needs_dictionary {
            self.normalize()?;
        }

        let mut layout = self.layout.write();
        let ObjectLayout { shape, storage } = &mut *layout;
        match storage {
            PropertyStorage::Fast(slots) => {
                let next = shape
                    .transition(key, details)
                    .ok_or_else(|| VmError::internal("fast-mode object with a dictionary shape"))?;
                slots.push(value);
                let offset = slots.len() - 1;
                self.barrier.record_write(&self.header, offset, slots[offset].heap_header());
                *shape = next;
            }
            PropertyStorage::Dictionary(dict) => {
                dict.add(key, value, details, self.barrier.as_ref())?;
            }
        }
        drop(layout);
        self.layout_changed();
        Ok(())
    }

    /// Delete an own property. Returns false if it is not configurable.
    pub fn delete_property(&self, key: &PropertyKey) -> VmResult<bool> {
        let Some(existing) = self.lookup_own(key) else {
            return Ok(true);
        };
        if !existing.details.is_configurable() {
            return Ok(false);
        }
        self.normalize()?;
        let removed = self
            .with_dictionary_mut(|dict, _| dict.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            self.layout_changed();
        }
        Ok(removed)
    }

    /// Switch to dictionary mode. No-op if already there.
    pub fn normalize(&self) -> VmResult<()> {
        let mut layout = self.layout.write();
        let ObjectLayout { shape, storage } = &mut *layout;
        let PropertyStorage::Fast(slots) = storage else {
            return Ok(());
        };
        let mut dict = PropertyDictionary::with_capacity(shape.property_count());
        for key in shape.keys() {
            let Some((offset, details)) = shape.lookup(key) else {
                continue;
            };
            let value = slots.get(offset).cloned().unwrap_or_default();
            dict.add(key.clone(), value, details, self.barrier.as_ref())?;
        }
        tracing::trace!(properties = dict.len(), "object normalized to dictionary mode");
        *storage = PropertyStorage::Dictionary(dict);
        *shape = Shape::dictionary();
        drop(layout);
        self.layout_changed();
        Ok(())
    }

    /// Replace the prototype.
    ///
    /// Returns false for a non-extensible object or if `proto` would create
    /// a cycle.
    pub fn set_prototype(&self, proto: Option<GcRef<JsObject>>) -> VmResult<bool> {
        let current = self.prototype();
        let same = match (&current, &proto) {
            (Some(a), Some(b)) => GcRef::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return Ok(true);
        }
        if !self.is_extensible() {
            return Ok(false);
        }
        let mut cursor = proto.clone();
        while let Some(obj) = cursor {
            if std::ptr::eq(obj.as_ptr(), self) {
                return Ok(false);
            }
            cursor = obj.lookup_parent();
        }

        if let Some(proto) = &proto {
            proto.is_prototype.store(true, Ordering::Release);
        }
        *self.prototype.write() = proto;
        // The old shape encoded the old prototype
        self.normalize()?;
        self.layout.write().shape = Shape::dictionary();
        bump_proto_epoch();
        Ok(true)
    }

    /// Own keys: integer indices ascending, then strings in creation order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let layout = self.layout.read();
        let ordered: Vec<PropertyKey> = match &layout.storage {
            PropertyStorage::Fast(_) => layout.shape.keys().to_vec(),
            PropertyStorage::Dictionary(dict) => dict
                .entries_in_order()
                .into_iter()
                .map(|entry| entry.key.clone())
                .collect(),
        };
        drop(layout);

        let mut indices: Vec<u32> = ordered.iter().filter_map(PropertyKey::as_index).collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(PropertyKey::Index)
            .chain(ordered.into_iter().filter(|key| key.as_index().is_none()))
            .collect()
    }
}

fn accessor_write(value: &Value) -> OwnWrite {
    match value {
        Value::AccessorPair(pair) => OwnWrite::Accessor(pair.clone()),
        // An accessor slot always holds a pair
        _ => OwnWrite::ReadOnly,
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layout = self.layout.read();
        let properties = match &layout.storage {
            PropertyStorage::Fast(slots) => slots.len(),
            PropertyStorage::Dictionary(dict) => dict.len(),
        };
        f.debug_struct("JsObject")
            .field("id", &self.header.id())
            .field("shape", &layout.shape.id())
            .field("properties", &properties)
            .field("proxy", &self.proxy.is_some())
            .finish()
    }
}
