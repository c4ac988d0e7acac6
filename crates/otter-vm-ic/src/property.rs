//! Property keys, attributes and bit-packed property details

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::string::JsString;
use crate::value::Value;

/// Property key (interned string or integer index)
///
/// Canonical numeric strings are always stored as `Index`, so `o["1"]` and
/// `o[1]` name the same property.
#[derive(Clone, Debug)]
pub enum PropertyKey {
    /// String property key
    String(Arc<JsString>),
    /// Integer index
    Index(u32),
}

impl PropertyKey {
    /// Create a string property key
    pub fn string(s: &str) -> Self {
        Self::from_js_string(JsString::intern(s))
    }

    /// Create from an interned string
    pub fn from_js_string(s: Arc<JsString>) -> Self {
        match s.as_array_index() {
            Some(index) => Self::Index(index),
            None => Self::String(s),
        }
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// ToPropertyKey for computed member access
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::from_js_string(s.clone()),
            Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n < u32::MAX as f64 => {
                Self::Index(*n as u32)
            }
            other => Self::string(&other.to_display_string()),
        }
    }

    /// Key as a value, as passed to proxy traps
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Index(i) => Value::string(&i.to_string()),
        }
    }

    /// Integer index, if this is one
    pub fn as_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            Self::String(_) => None,
        }
    }

    /// Hash used to start a dictionary probe sequence
    #[inline]
    pub fn hash_value(&self) -> u64 {
        match self {
            Self::String(s) => s.hash_value(),
            Self::Index(i) => (*i as u64 ^ 0x5bd1_e995).wrapping_mul(0x9e37_79b9_7f4a_7c15),
        }
    }

    /// Stable identity of the key, used by keyed feedback slots
    pub fn key_id(&self) -> u64 {
        match self {
            Self::String(s) => s.header().id(),
            Self::Index(i) => (1 << 63) | *i as u64,
        }
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Interned: identity is equality
            (Self::String(a), Self::String(b)) => Arc::ptr_eq(a, b),
            (Self::Index(a), Self::Index(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s.as_str()),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

/// Data or accessor property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Plain stored value
    Data,
    /// Getter/setter pair
    Accessor,
}

/// Property attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable (ignored for accessors)
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Enumerable and configurable, but not writable
    pub const fn read_only() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

/// Bit-packed property descriptor
///
/// ```text
/// bit 0      kind (0 = data, 1 = accessor)
/// bit 1      read-only
/// bit 2      not enumerable
/// bit 3      not configurable
/// bits 8..32 enumeration index (dictionary mode only)
/// ```
///
/// Kind and attribute bits are independent of each other.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyDetails(u32);

impl PropertyDetails {
    /// Kind bit; set for accessors
    pub const KIND: u32 = 1 << 0;
    /// Read-only attribute bit
    pub const READ_ONLY: u32 = 1 << 1;
    /// Not-enumerable attribute bit
    pub const DONT_ENUM: u32 = 1 << 2;
    /// Not-configurable attribute bit
    pub const DONT_DELETE: u32 = 1 << 3;
    /// Any of these bits makes an in-place dictionary store inapplicable
    pub const STORE_DISQUALIFYING_MASK: u32 = Self::KIND | Self::READ_ONLY;

    const FLAGS_MASK: u32 = 0xff;
    const INDEX_SHIFT: u32 = 8;
    /// Largest enumeration index that fits the field
    pub const MAX_ENUMERATION_INDEX: u32 = u32::MAX >> Self::INDEX_SHIFT;

    /// Pack kind and attributes, with no enumeration index
    pub const fn new(kind: PropertyKind, attributes: PropertyAttributes) -> Self {
        let mut bits = match kind {
            PropertyKind::Data => 0,
            PropertyKind::Accessor => Self::KIND,
        };
        if !attributes.writable {
            bits |= Self::READ_ONLY;
        }
        if !attributes.enumerable {
            bits |= Self::DONT_ENUM;
        }
        if !attributes.configurable {
            bits |= Self::DONT_DELETE;
        }
        Self(bits)
    }

    /// Data property details
    pub const fn data(attributes: PropertyAttributes) -> Self {
        Self::new(PropertyKind::Data, attributes)
    }

    /// Accessor property details
    pub const fn accessor(attributes: PropertyAttributes) -> Self {
        Self::new(PropertyKind::Accessor, attributes)
    }

    /// Raw bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// From raw bits
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Property kind
    #[inline]
    pub fn kind(self) -> PropertyKind {
        if self.0 & Self::KIND == 0 {
            PropertyKind::Data
        } else {
            PropertyKind::Accessor
        }
    }

    /// Is an accessor property
    #[inline]
    pub fn is_accessor(self) -> bool {
        self.0 & Self::KIND != 0
    }

    /// Is the read-only bit set
    #[inline]
    pub fn is_read_only(self) -> bool {
        self.0 & Self::READ_ONLY != 0
    }

    /// Is enumerable
    #[inline]
    pub fn is_enumerable(self) -> bool {
        self.0 & Self::DONT_ENUM == 0
    }

    /// Is configurable
    #[inline]
    pub fn is_configurable(self) -> bool {
        self.0 & Self::DONT_DELETE == 0
    }

    /// Can a store overwrite the value slot in place
    #[inline]
    pub fn permits_fast_store(self) -> bool {
        self.0 & Self::STORE_DISQUALIFYING_MASK == 0
    }

    /// Decoded attributes
    pub fn attributes(self) -> PropertyAttributes {
        PropertyAttributes {
            writable: !self.is_read_only(),
            enumerable: self.is_enumerable(),
            configurable: self.is_configurable(),
        }
    }

    /// Creation-order index (0 when unassigned)
    #[inline]
    pub fn enumeration_index(self) -> u32 {
        self.0 >> Self::INDEX_SHIFT
    }

    /// Same flags, different enumeration index
    #[inline]
    pub fn with_enumeration_index(self, index: u32) -> Self {
        debug_assert!(index <= Self::MAX_ENUMERATION_INDEX);
        Self((self.0 & Self::FLAGS_MASK) | (index << Self::INDEX_SHIFT))
    }

    /// Flags only
    #[inline]
    pub fn without_enumeration_index(self) -> Self {
        Self(self.0 & Self::FLAGS_MASK)
    }
}

impl std::fmt::Debug for PropertyDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDetails")
            .field("kind", &self.kind())
            .field("read_only", &self.is_read_only())
            .field("enumerable", &self.is_enumerable())
            .field("configurable", &self.is_configurable())
            .field("index", &self.enumeration_index())
            .finish()
    }
}
