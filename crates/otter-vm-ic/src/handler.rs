//! Handler computation and application
//!
//! A miss computes a [`Handler`] for the receiver's shape; the call-site
//! drivers apply cached handlers on later hits. Applying a handler re-checks
//! the receiver under its own lock and reports `None` when the handler no
//! longer fits, so a stale handler costs a miss but never a wrong result.

use std::sync::Arc;

use otter_vm_feedback::{Handler, LanguageMode, MissObservation, ShapeId};

use crate::context::VmContext;
use crate::error::VmResult;
use crate::fast_path::{DictionaryLoad, DictionaryStore, load_from_dictionary, store_to_dictionary};
use crate::keyed_store_generic::KeyedStoreGeneric;
use crate::object::{JsObject, MAX_FAST_PROPERTIES, PropertyLocation};
use crate::property::{PropertyAttributes, PropertyDetails, PropertyKey};
use crate::runtime::RuntimeFallback;
use crate::shape::Shape;
use crate::value::Value;

/// Shape of a receiver that caches can key on
pub fn receiver_shape(receiver: &Value) -> Option<ShapeId> {
    receiver.as_object().and_then(|obj| obj.shape_id())
}

/// What a load miss observed
pub fn load_observation(receiver: &Value, key: &PropertyKey) -> MissObservation {
    let Some(obj) = receiver.as_object() else {
        return MissObservation::uncacheable();
    };
    let Some(shape) = obj.shape_id() else {
        return MissObservation::uncacheable();
    };
    MissObservation::new(shape, compute_load_handler(obj, key))
}

/// Load handler for `key` on `obj`'s current shape
pub fn compute_load_handler(obj: &JsObject, key: &PropertyKey) -> Handler {
    match obj.lookup_own(key) {
        Some(own) if own.details.is_accessor() => Handler::AccessorForward,
        Some(own) => match own.location {
            PropertyLocation::Field(offset) => Handler::FastField { offset: offset as u32 },
            PropertyLocation::Dictionary(_) => Handler::Dictionary,
        },
        // Inherited or absent
        None => Handler::Generic,
    }
}

/// What a store miss observed.
///
/// For a transition the target shape is returned too; transitions are held
/// weakly, so the caller keeps it alive until the store has landed.
pub fn store_observation(receiver: &Value, key: &PropertyKey) -> (MissObservation, Option<Arc<Shape>>) {
    let Some(obj) = receiver.as_object() else {
        return (MissObservation::uncacheable(), None);
    };
    let Some(shape) = obj.shape_id() else {
        return (MissObservation::uncacheable(), None);
    };
    let (handler, target) = compute_store_handler(obj, key);
    (MissObservation::new(shape, handler), target)
}

/// Store handler for `key` on `obj`'s current shape
pub fn compute_store_handler(obj: &JsObject, key: &PropertyKey) -> (Handler, Option<Arc<Shape>>) {
    if let Some(own) = obj.lookup_own(key) {
        let handler = if own.details.is_accessor() {
            Handler::AccessorForward
        } else if own.details.is_read_only() {
            Handler::Generic
        } else {
            match own.location {
                PropertyLocation::Field(offset) => Handler::FastField { offset: offset as u32 },
                PropertyLocation::Dictionary(_) => Handler::Dictionary,
            }
        };
        return (handler, None);
    }

    let mut holder = obj.prototype();
    while let Some(proto) = holder {
        if proto.is_proxy() {
            return (Handler::Generic, None);
        }
        if let Some(own) = proto.lookup_own(key) {
            if own.details.is_accessor() {
                return (Handler::AccessorForward, None);
            }
            if own.details.is_read_only() {
                return (Handler::Generic, None);
            }
            break;
        }
        holder = proto.prototype();
    }

    let shape = obj.shape();
    if !obj.is_extensible() || shape.is_dictionary() || shape.property_count() >= MAX_FAST_PROPERTIES {
        return (Handler::Generic, None);
    }
    let details = PropertyDetails::data(PropertyAttributes::data());
    match shape.transition(key.clone(), details) {
        Some(target) => {
            let handler = Handler::TransitionAndStore {
                target: target.id(),
                offset: target.offset().unwrap_or_default() as u32,
            };
            (handler, Some(target))
        }
        None => (Handler::Generic, None),
    }
}

/// Apply a cached load handler to a receiver of shape `shape`.
///
/// `None` means the handler no longer applies.
pub fn apply_load_handler<R: RuntimeFallback + ?Sized>(
    runtime: &R,
    ctx: &mut VmContext,
    shape: ShapeId,
    handler: Handler,
    receiver: &Value,
    key: &PropertyKey,
) -> VmResult<Option<Value>> {
    let Some(obj) = receiver.as_object() else {
        return Ok(None);
    };
    match handler {
        Handler::FastField { offset } => Ok(obj.read_field(shape, offset as usize)),
        Handler::Dictionary => match load_from_dictionary(ctx, receiver, obj, key)? {
            DictionaryLoad::Found(value) => Ok(Some(value)),
            DictionaryLoad::NotFound | DictionaryLoad::NotDictionary => Ok(None),
        },
        Handler::AccessorForward | Handler::Generic => runtime.get_property(ctx, receiver, key).map(Some),
        Handler::TransitionAndStore { .. } => Ok(None),
    }
}

/// Apply a cached store handler to a receiver of shape `shape`.
///
/// `None` means the handler no longer applies and nothing was stored.
pub fn apply_store_handler(
    ctx: &mut VmContext,
    shape: ShapeId,
    handler: Handler,
    receiver: &Value,
    key: &PropertyKey,
    value: Value,
    mode: LanguageMode,
) -> VmResult<Option<Value>> {
    let Some(obj) = receiver.as_object() else {
        return Ok(None);
    };
    match handler {
        Handler::FastField { offset } => {
            Ok(obj.write_field(shape, offset as usize, value.clone()).then_some(value))
        }
        Handler::Dictionary => match store_to_dictionary(obj, key, value.clone())? {
            DictionaryStore::Stored => Ok(Some(value)),
            _ => Ok(None),
        },
        Handler::TransitionAndStore { target, .. } => {
            Ok(obj.transition_and_store(shape, key, target, value.clone()).then_some(value))
        }
        Handler::AccessorForward | Handler::Generic => KeyedStoreGeneric::generate(mode)
            .store(ctx, receiver, key, value)
            .map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_handlers_by_location() {
        let ctx = VmContext::default();
        let obj = ctx.new_object(None);
        obj.add_data_property(PropertyKey::string("a"), Value::int32(1)).unwrap();
        obj.define_accessor(PropertyKey::string("g"), None, None, PropertyAttributes::data())
            .unwrap();

        assert_eq!(
            compute_load_handler(&obj, &PropertyKey::string("a")),
            Handler::FastField { offset: 0 }
        );
        assert_eq!(compute_load_handler(&obj, &PropertyKey::string("g")), Handler::AccessorForward);
        assert_eq!(compute_load_handler(&obj, &PropertyKey::string("nope")), Handler::Generic);

        obj.normalize().unwrap();
        assert_eq!(compute_load_handler(&obj, &PropertyKey::string("a")), Handler::Dictionary);
    }

    #[test]
    fn test_store_transition_targets_next_offset() {
        let ctx = VmContext::default();
        let obj = ctx.new_object(None);
        obj.add_data_property(PropertyKey::string("a"), Value::int32(1)).unwrap();

        let (handler, target) = compute_store_handler(&obj, &PropertyKey::string("b"));
        let target = target.unwrap();
        assert_eq!(
            handler,
            Handler::TransitionAndStore {
                target: target.id(),
                offset: 1
            }
        );
    }

    #[test]
    fn test_store_read_only_and_primitive_are_generic() {
        let ctx = VmContext::default();
        let obj = ctx.new_object(None);
        obj.define_property(PropertyKey::string("r"), Value::Null, PropertyAttributes::read_only())
            .unwrap();
        assert_eq!(compute_store_handler(&obj, &PropertyKey::string("r")).0, Handler::Generic);

        let (obs, _) = store_observation(&Value::int32(3), &PropertyKey::string("r"));
        assert_eq!(obs, MissObservation::uncacheable());
    }
}
