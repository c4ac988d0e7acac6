//! JavaScript values
//!
//! Heap values hold a [`GcRef`] to their cell. Accessor pairs are values too,
//! but only ever appear in a property's value slot, never in user code.

use std::sync::Arc;

use otter_vm_gc::GcHeader;

use crate::accessor::AccessorPair;
use crate::function::JsFunction;
use crate::gc::GcRef;
use crate::object::JsObject;
use crate::string::JsString;

/// A JavaScript value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// IEEE 754 double
    Number(f64),
    /// Interned string
    String(Arc<JsString>),
    /// Ordinary or proxy object
    Object(GcRef<JsObject>),
    /// Callable
    Function(GcRef<JsFunction>),
    /// Getter/setter pair stored in an accessor property's value slot
    AccessorPair(GcRef<AccessorPair>),
}

impl Value {
    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Number value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Number value from a 32-bit integer
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Self::Number(n as f64)
    }

    /// Interned string value
    pub fn string(s: &str) -> Self {
        Self::String(JsString::intern(s))
    }

    /// Object value
    pub fn object(obj: GcRef<JsObject>) -> Self {
        Self::Object(obj)
    }

    /// Function value
    pub fn function(func: GcRef<JsFunction>) -> Self {
        Self::Function(func)
    }

    /// Is `undefined`
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Is `null`
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Is `undefined` or `null`
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Is an object (proxies included)
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&GcRef<JsObject>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get as function
    pub fn as_function(&self) -> Option<&GcRef<JsFunction>> {
        match self {
            Self::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&Arc<JsString>> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as accessor pair
    pub fn as_accessor_pair(&self) -> Option<&GcRef<AccessorPair>> {
        match self {
            Self::AccessorPair(pair) => Some(pair),
            _ => None,
        }
    }

    /// Header of the referenced heap cell, for write barrier notifications
    pub fn heap_header(&self) -> Option<&GcHeader> {
        match self {
            Self::String(s) => Some(s.header()),
            Self::Object(obj) => Some(obj.header()),
            Self::Function(func) => Some(func.header()),
            Self::AccessorPair(pair) => Some(pair.header()),
            _ => None,
        }
    }

    /// `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) | Self::AccessorPair(_) => "object",
            Self::Function(_) => "function",
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.as_str().is_empty(),
            Self::Object(_) | Self::Function(_) | Self::AccessorPair(_) => true,
        }
    }

    /// String conversion used for keys and error messages
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => number_to_string(*n),
            Self::String(s) => s.as_str().to_string(),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Function(func) => format!("function {}() {{ [native code] }}", func.name()),
            Self::AccessorPair(_) => "[accessor]".to_string(),
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        // -0 prints as "0"
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    /// Strict equality, except that NaN equals NaN so tests can compare
    /// results directly
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => GcRef::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => GcRef::ptr_eq(a, b),
            (Self::AccessorPair(a), Self::AccessorPair(b)) => GcRef::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s.as_str()),
            Self::Object(obj) => write!(f, "{obj:?}"),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::int32(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}
