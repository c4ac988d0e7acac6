//! Shape-agnostic keyed store for megamorphic sites
//!
//! Used once a site has seen more shapes than its polymorphic cache holds.
//! It resolves the property from scratch on every call: own property first,
//! then up the prototype chain, proxies included.
//!
//! | Found                        | Result                                   |
//! |------------------------------|------------------------------------------|
//! | accessor (own or inherited)  | setter runs with the original receiver   |
//! | read-only (own or inherited) | mode fork                                |
//! | own writable data            | value slot overwritten                   |
//! | inherited writable / absent  | new own property if extensible, else fork|
//!
//! The mode fork: strict mode raises a TypeError, sloppy mode drops the
//! write. Every path returns the stored value on success.

use otter_vm_feedback::LanguageMode;

use crate::accessor::call_setter;
use crate::context::VmContext;
use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::object::{JsObject, OwnWrite};
use crate::property::PropertyKey;
use crate::value::Value;

/// Generic keyed store, parameterized by language mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedStoreGeneric {
    mode: LanguageMode,
}

impl KeyedStoreGeneric {
    /// Store path for `mode`
    pub fn generate(mode: LanguageMode) -> Self {
        Self { mode }
    }

    /// Language mode
    pub fn mode(&self) -> LanguageMode {
        self.mode
    }

    /// `receiver[key] = value` with a computed key
    pub fn store_keyed(&self, ctx: &mut VmContext, receiver: &Value, key: &Value, value: Value) -> VmResult<Value> {
        let key = PropertyKey::from_value(key);
        self.store(ctx, receiver, &key, value)
    }

    /// `receiver[key] = value`
    pub fn store(&self, ctx: &mut VmContext, receiver: &Value, key: &PropertyKey, value: Value) -> VmResult<Value> {
        // Own data writes land on `obj`; a trapless proxy forwards them to its target
        let mut obj = match receiver {
            Value::Object(obj) => obj.clone(),
            Value::Undefined | Value::Null => {
                return Err(VmError::type_error(format!(
                    "Cannot set properties of {} (setting '{key}')",
                    receiver.to_display_string()
                )));
            }
            _ => {
                self.fail(format!(
                    "Cannot create property '{key}' on {} '{}'",
                    receiver.type_of(),
                    receiver.to_display_string()
                ))?;
                return Ok(value);
            }
        };

        let mut holder = obj.clone();
        loop {
            if let Some(traps) = holder.proxy_traps() {
                if let Some(set) = traps.set.clone() {
                    let args = [
                        Value::Object(traps.target.clone()),
                        key.to_value(),
                        value.clone(),
                        receiver.clone(),
                    ];
                    let accepted = ctx.call_function(&set, &Value::undefined(), &args)?;
                    if !accepted.to_boolean() {
                        self.fail(format!("'set' on proxy: trap returned falsish for property '{key}'"))?;
                    }
                    return Ok(value);
                }
                let target = traps.target.clone();
                if GcRef::ptr_eq(&holder, &obj) {
                    obj = target.clone();
                }
                holder = target;
                continue;
            }

            if GcRef::ptr_eq(&holder, &obj) {
                match obj.write_own_data(key, value.clone())? {
                    OwnWrite::Written => return Ok(value),
                    OwnWrite::ReadOnly => return self.read_only(key, value),
                    OwnWrite::Accessor(pair) => {
                        call_setter(ctx, &pair, receiver, value.clone(), key, self.mode)?;
                        return Ok(value);
                    }
                    OwnWrite::Absent => {}
                }
            } else if let Some((stored, details)) = holder.get_own_property(key) {
                if details.is_accessor() {
                    let Value::AccessorPair(pair) = stored else {
                        return Err(VmError::internal("accessor property without an accessor pair"));
                    };
                    call_setter(ctx, &pair, receiver, value.clone(), key, self.mode)?;
                    return Ok(value);
                }
                if details.is_read_only() {
                    return self.read_only(key, value);
                }
                // Writable inherited data property: shadow it on the receiver
                break;
            }

            match holder.prototype() {
                Some(proto) => holder = proto,
                None => break,
            }
        }

        self.add(&obj, key, value)
    }

    fn add(&self, obj: &JsObject, key: &PropertyKey, value: Value) -> VmResult<Value> {
        if !obj.add_data_property(key.clone(), value.clone())? {
            self.fail(format!("Cannot add property {key}, object is not extensible"))?;
        }
        Ok(value)
    }

    fn read_only(&self, key: &PropertyKey, value: Value) -> VmResult<Value> {
        self.fail(format!("Cannot assign to read only property '{key}' of object"))?;
        Ok(value)
    }

    /// The strict/sloppy fork
    fn fail(&self, message: String) -> VmResult<()> {
        match self.mode {
            LanguageMode::Strict => Err(VmError::type_error(message)),
            LanguageMode::Sloppy => {
                tracing::trace!(%message, "sloppy-mode store dropped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyAttributes;

    #[test]
    fn test_primitive_receiver_fork() {
        let mut ctx = VmContext::default();
        let key = PropertyKey::string("x");
        let sloppy = KeyedStoreGeneric::generate(LanguageMode::Sloppy);
        let strict = KeyedStoreGeneric::generate(LanguageMode::Strict);

        assert_eq!(
            sloppy.store(&mut ctx, &Value::int32(1), &key, Value::int32(2)).unwrap(),
            Value::int32(2)
        );
        assert!(strict.store(&mut ctx, &Value::int32(1), &key, Value::int32(2)).is_err());
        assert!(sloppy.store(&mut ctx, &Value::undefined(), &key, Value::int32(2)).is_err());
    }

    #[test]
    fn test_inherited_read_only_blocks_add() {
        let mut ctx = VmContext::default();
        let proto = ctx.new_object(None);
        proto
            .define_property(PropertyKey::string("k"), Value::int32(1), PropertyAttributes::read_only())
            .unwrap();
        let obj = ctx.new_object(Some(proto));
        let receiver = Value::Object(obj.clone());

        KeyedStoreGeneric::generate(LanguageMode::Sloppy)
            .store_keyed(&mut ctx, &receiver, &Value::string("k"), Value::int32(5))
            .unwrap();
        assert!(!obj.has_own(&PropertyKey::string("k")));
    }

    #[test]
    fn test_inherited_writable_is_shadowed() {
        let mut ctx = VmContext::default();
        let proto = ctx.new_object(None);
        proto.add_data_property(PropertyKey::string("k"), Value::int32(1)).unwrap();
        let obj = ctx.new_object(Some(proto.clone()));

        KeyedStoreGeneric::generate(LanguageMode::Strict)
            .store(&mut ctx, &Value::Object(obj.clone()), &PropertyKey::string("k"), Value::int32(5))
            .unwrap();
        assert_eq!(
            obj.get_own_property(&PropertyKey::string("k")).map(|(v, _)| v),
            Some(Value::int32(5))
        );
        assert_eq!(
            proto.get_own_property(&PropertyKey::string("k")).map(|(v, _)| v),
            Some(Value::int32(1))
        );
    }
}
