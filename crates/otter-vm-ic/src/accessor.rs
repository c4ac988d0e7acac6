//! Accessor invocation
//!
//! A located property is either a plain data value or an [`AccessorPair`].
//! Getter and setter calls re-enter user code; callers must not hold an
//! object or dictionary lock across them and must re-resolve any entry index
//! they computed before the call.

use otter_vm_feedback::LanguageMode;
use otter_vm_gc::{GcHeader, tags};

use crate::context::VmContext;
use crate::error::{VmError, VmResult};
use crate::function::JsFunction;
use crate::gc::GcRef;
use crate::property::{PropertyDetails, PropertyKey, PropertyKind};
use crate::value::Value;

/// Getter/setter pair stored as the value of an accessor property.
/// Either half may be absent.
pub struct AccessorPair {
    header: GcHeader,
    getter: Option<GcRef<JsFunction>>,
    setter: Option<GcRef<JsFunction>>,
}

impl AccessorPair {
    /// Allocate a pair
    pub fn new(getter: Option<GcRef<JsFunction>>, setter: Option<GcRef<JsFunction>>) -> GcRef<Self> {
        GcRef::new(Self {
            header: GcHeader::new(tags::ACCESSOR_PAIR),
            getter,
            setter,
        })
    }

    /// Getter half
    pub fn getter(&self) -> Option<&GcRef<JsFunction>> {
        self.getter.as_ref()
    }

    /// Setter half
    pub fn setter(&self) -> Option<&GcRef<JsFunction>> {
        self.setter.as_ref()
    }

    /// GC header of the pair cell
    pub fn header(&self) -> &GcHeader {
        &self.header
    }
}

impl std::fmt::Debug for AccessorPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorPair")
            .field("getter", &self.getter.as_ref().map(|g| g.name().to_string()))
            .field("setter", &self.setter.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

/// Resolve a located property to the value a load observes.
///
/// Data properties return `value` unchanged. Accessor properties call the
/// getter with `receiver` as `this`; a missing getter yields `undefined`.
pub fn call_getter_if_accessor(
    ctx: &mut VmContext,
    details: PropertyDetails,
    value: Value,
    receiver: &Value,
) -> VmResult<Value> {
    if details.kind() == PropertyKind::Data {
        return Ok(value);
    }
    let Value::AccessorPair(pair) = value else {
        return Err(VmError::internal("accessor property without an accessor pair"));
    };
    match pair.getter() {
        Some(getter) => ctx.call_function(getter, receiver, &[]),
        None => Ok(Value::undefined()),
    }
}

/// Run the setter half of `pair` with `receiver` as `this`.
///
/// Without a setter the store fails: a TypeError in strict mode, a no-op in
/// sloppy mode.
pub fn call_setter(
    ctx: &mut VmContext,
    pair: &AccessorPair,
    receiver: &Value,
    value: Value,
    key: &PropertyKey,
    mode: LanguageMode,
) -> VmResult<()> {
    match pair.setter() {
        Some(setter) => {
            ctx.call_function(setter, receiver, &[value])?;
            Ok(())
        }
        None if mode.is_strict() => Err(VmError::type_error(format!(
            "Cannot set property {key} of {} which has only a getter",
            receiver.to_display_string()
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyAttributes;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_data_property_is_returned_as_is() {
        let mut ctx = VmContext::default();
        let details = PropertyDetails::data(PropertyAttributes::data());
        let value = call_getter_if_accessor(&mut ctx, details, Value::int32(7), &Value::undefined())
            .unwrap();
        assert_eq!(value, Value::int32(7));
    }

    #[test]
    fn test_getter_receives_receiver() {
        let mut ctx = VmContext::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_getter = seen.clone();
        let getter = JsFunction::native("get", move |_, this, _| {
            seen_in_getter.fetch_add(1, Ordering::SeqCst);
            Ok(this.clone())
        });
        let pair = AccessorPair::new(Some(getter), None);
        let details = PropertyDetails::accessor(PropertyAttributes::data());

        let result = call_getter_if_accessor(
            &mut ctx,
            details,
            Value::AccessorPair(pair),
            &Value::int32(5),
        )
        .unwrap();
        assert_eq!(result, Value::int32(5));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_setter_depends_on_mode() {
        let mut ctx = VmContext::default();
        let pair = AccessorPair::new(None, None);
        let key = PropertyKey::string("x");

        assert!(
            call_setter(&mut ctx, &pair, &Value::undefined(), Value::int32(1), &key, LanguageMode::Sloppy)
                .is_ok()
        );
        let err = call_setter(&mut ctx, &pair, &Value::undefined(), Value::int32(1), &key, LanguageMode::Strict)
            .unwrap_err();
        assert!(err.is_type_error());
    }
}
