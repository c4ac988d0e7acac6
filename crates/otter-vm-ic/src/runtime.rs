//! Generic runtime fallback
//!
//! [`RuntimeFallback`] is the set of entry points the dispatchers escalate
//! to. Its answers are authoritative: once a dispatcher has escalated, the
//! access is finished by the fallback. Miss entry points also drive the
//! slot's cache state; plain get/store entry points never touch feedback.

use otter_vm_feedback::{FeedbackSlot, FeedbackVector, IcTransition, LanguageMode};

use crate::accessor::call_getter_if_accessor;
use crate::context::VmContext;
use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::handler::{load_observation, store_observation};
use crate::keyed_store_generic::KeyedStoreGeneric;
use crate::object::{JsObject, proto_epoch};
use crate::property::PropertyKey;
use crate::value::Value;

/// Entry points of the generic runtime used by the IC dispatchers
pub trait RuntimeFallback {
    /// Named load miss: update feedback, then load
    fn miss_load(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        name: &PropertyKey,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value>;

    /// Keyed load miss: update feedback, then load
    fn miss_keyed_load(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value>;

    /// Global load miss: update feedback, then load
    fn miss_load_global(
        &self,
        ctx: &mut VmContext,
        name: &PropertyKey,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value>;

    /// Global load without feedback; ReferenceError for undeclared names
    fn slow_load_global(&self, ctx: &mut VmContext, name: &PropertyKey) -> VmResult<Value>;

    /// Named store miss: update feedback, then store
    fn miss_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        name: &PropertyKey,
    ) -> VmResult<Value>;

    /// Keyed store miss: update feedback, then store
    fn miss_keyed_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value>;

    /// Keyed store that leaves feedback alone
    fn slow_keyed_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value>;

    /// `receiver[name]`
    fn get_property(&self, ctx: &mut VmContext, receiver: &Value, name: &PropertyKey) -> VmResult<Value>;

    /// `receiver[key]` with a computed key
    fn keyed_get_property(&self, ctx: &mut VmContext, receiver: &Value, key: &Value) -> VmResult<Value>;

    /// `receiver[key] = value` without per-shape caching
    fn generic_keyed_store(
        &self,
        ctx: &mut VmContext,
        mode: LanguageMode,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<Value>;
}

/// The complete, shape-agnostic property algorithm
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericRuntime;

impl GenericRuntime {
    /// Walk the prototype chain from `start`, with `receiver` as `this` for
    /// getters and traps
    fn get_from_object(
        &self,
        ctx: &mut VmContext,
        start: &GcRef<JsObject>,
        key: &PropertyKey,
        receiver: &Value,
    ) -> VmResult<Value> {
        let mut holder = start.clone();
        loop {
            if let Some(traps) = holder.proxy_traps() {
                if let Some(get) = traps.get.clone() {
                    let args = [Value::Object(traps.target.clone()), key.to_value(), receiver.clone()];
                    return ctx.call_function(&get, &Value::undefined(), &args);
                }
                holder = traps.target.clone();
                continue;
            }
            if let Some((value, details)) = holder.get_own_property(key) {
                return call_getter_if_accessor(ctx, details, value, receiver);
            }
            match holder.prototype() {
                Some(proto) => holder = proto,
                None => return Ok(Value::undefined()),
            }
        }
    }

    fn has_property(&self, start: &GcRef<JsObject>, key: &PropertyKey) -> bool {
        let mut holder = start.clone();
        loop {
            if let Some(traps) = holder.proxy_traps() {
                holder = traps.target.clone();
                continue;
            }
            if holder.has_own(key) {
                return true;
            }
            match holder.prototype() {
                Some(proto) => holder = proto,
                None => return false,
            }
        }
    }
}

fn trace_transition(slot: FeedbackSlot, transition: &IcTransition) {
    if transition.changed_state() {
        tracing::debug!(
            slot = %slot,
            from = transition.from,
            to = transition.to,
            "IC state transition"
        );
    } else {
        tracing::trace!(slot = %slot, state = transition.to, "IC miss");
    }
}

impl RuntimeFallback for GenericRuntime {
    fn miss_load(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        name: &PropertyKey,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value> {
        vector.expect_load(slot)?;
        let observation = load_observation(receiver, name);
        let transition = vector.record_miss(slot, observation, ctx.config().polymorphic_capacity, proto_epoch())?;
        trace_transition(slot, &transition);
        self.get_property(ctx, receiver, name)
    }

    fn miss_keyed_load(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value> {
        vector.expect_load(slot)?;
        let key = PropertyKey::from_value(key);
        let observation = load_observation(receiver, &key);
        let transition = vector.record_keyed_miss(
            slot,
            key.key_id(),
            observation,
            ctx.config().polymorphic_capacity,
            proto_epoch(),
        )?;
        trace_transition(slot, &transition);
        self.get_property(ctx, receiver, &key)
    }

    fn miss_load_global(
        &self,
        ctx: &mut VmContext,
        name: &PropertyKey,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value> {
        vector.expect_load(slot)?;
        let global = Value::Object(ctx.global().clone());
        let observation = load_observation(&global, name);
        let transition = vector.record_miss(slot, observation, ctx.config().polymorphic_capacity, proto_epoch())?;
        trace_transition(slot, &transition);
        self.slow_load_global(ctx, name)
    }

    fn slow_load_global(&self, ctx: &mut VmContext, name: &PropertyKey) -> VmResult<Value> {
        let global = ctx.global().clone();
        if !self.has_property(&global, name) {
            return Err(VmError::reference_error(format!("{name} is not defined")));
        }
        self.get_from_object(ctx, &global, name, &Value::Object(global.clone()))
    }

    fn miss_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        name: &PropertyKey,
    ) -> VmResult<Value> {
        let mode = vector.expect_store(slot)?;
        let (observation, _target) = store_observation(receiver, name);
        let transition = vector.record_miss(slot, observation, ctx.config().polymorphic_capacity, proto_epoch())?;
        trace_transition(slot, &transition);
        KeyedStoreGeneric::generate(mode).store(ctx, receiver, name, value)
    }

    fn miss_keyed_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value> {
        let mode = vector.expect_store(slot)?;
        let key = PropertyKey::from_value(key);
        let (observation, _target) = store_observation(receiver, &key);
        let transition = vector.record_keyed_miss(
            slot,
            key.key_id(),
            observation,
            ctx.config().polymorphic_capacity,
            proto_epoch(),
        )?;
        trace_transition(slot, &transition);
        KeyedStoreGeneric::generate(mode).store(ctx, receiver, &key, value)
    }

    fn slow_keyed_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value> {
        let mode = vector.expect_store(slot)?;
        KeyedStoreGeneric::generate(mode).store_keyed(ctx, receiver, key, value)
    }

    fn get_property(&self, ctx: &mut VmContext, receiver: &Value, name: &PropertyKey) -> VmResult<Value> {
        match receiver {
            Value::Undefined | Value::Null => Err(VmError::type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                receiver.to_display_string()
            ))),
            Value::Object(obj) => self.get_from_object(ctx, obj, name, receiver),
            Value::String(s) => Ok(match name {
                PropertyKey::String(n) if n.as_str() == "length" => Value::number(s.len_utf16() as f64),
                PropertyKey::Index(i) => s
                    .as_str()
                    .encode_utf16()
                    .nth(*i as usize)
                    .map(|unit| Value::string(&String::from_utf16_lossy(&[unit])))
                    .unwrap_or_default(),
                _ => Value::undefined(),
            }),
            _ => Ok(Value::undefined()),
        }
    }

    fn keyed_get_property(&self, ctx: &mut VmContext, receiver: &Value, key: &Value) -> VmResult<Value> {
        let key = PropertyKey::from_value(key);
        self.get_property(ctx, receiver, &key)
    }

    fn generic_keyed_store(
        &self,
        ctx: &mut VmContext,
        mode: LanguageMode,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<Value> {
        KeyedStoreGeneric::generate(mode).store_keyed(ctx, receiver, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_vm_feedback::FeedbackSlotKind;

    #[test]
    fn test_nullish_receiver_is_type_error() {
        let mut ctx = VmContext::default();
        let err = GenericRuntime
            .get_property(&mut ctx, &Value::null(), &PropertyKey::string("x"))
            .unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_string_receiver() {
        let mut ctx = VmContext::default();
        let s = Value::string("héllo");
        assert_eq!(
            GenericRuntime.get_property(&mut ctx, &s, &PropertyKey::string("length")).unwrap(),
            Value::int32(5)
        );
        assert_eq!(
            GenericRuntime.keyed_get_property(&mut ctx, &s, &Value::int32(1)).unwrap(),
            Value::string("é")
        );
    }

    #[test]
    fn test_undeclared_global_is_reference_error() {
        let mut ctx = VmContext::default();
        let vector = FeedbackVector::new([FeedbackSlotKind::LoadGlobal]);
        let err = GenericRuntime
            .miss_load_global(&mut ctx, &PropertyKey::string("nope"), FeedbackSlot(0), &vector)
            .unwrap_err();
        assert!(matches!(err, VmError::ReferenceError(_)));
    }

    #[test]
    fn test_store_miss_on_load_slot_is_rejected() {
        let mut ctx = VmContext::default();
        let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty]);
        let receiver = Value::Object(ctx.new_object(None));
        let err = GenericRuntime
            .miss_store(
                &mut ctx,
                Value::int32(1),
                FeedbackSlot(0),
                &vector,
                &receiver,
                &PropertyKey::string("x"),
            )
            .unwrap_err();
        assert!(matches!(err, VmError::Feedback(_)));
    }
}
