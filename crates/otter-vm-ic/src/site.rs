//! Call-site drivers
//!
//! A site owns one feedback slot. Each access first tries the handler the
//! slot has cached for the receiver's shape; when there is none, or it no
//! longer applies, the access goes to the dispatcher matching the slot's
//! state:
//!
//! - saturated load sites use the dictionary fast path for dictionary-mode
//!   receivers and the slow path otherwise
//! - saturated keyed store sites use the megamorphic generic store
//! - saturated named store sites use the dictionary fast path for
//!   dictionary-mode receivers and the miss handler otherwise
//! - every other state goes to the miss handler

use std::sync::Arc;

use otter_vm_feedback::{FeedbackSlot, FeedbackVector, Handler, InlineCacheState, LanguageMode};

use crate::context::VmContext;
use crate::error::VmResult;
use crate::handler::{apply_load_handler, apply_store_handler, receiver_shape};
use crate::ic::{IcDispatcher, LoadGlobalWithVector, LoadWithVector, StoreWithVector};
use crate::object::proto_epoch;
use crate::property::PropertyKey;
use crate::runtime::RuntimeFallback;
use crate::value::Value;

fn is_dictionary_receiver(receiver: &Value) -> bool {
    receiver.as_object().is_some_and(|obj| obj.is_dictionary_mode())
}

/// `receiver.name`
#[derive(Debug, Clone)]
pub struct LoadSite {
    vector: Arc<FeedbackVector>,
    slot: FeedbackSlot,
    name: PropertyKey,
}

impl LoadSite {
    /// Site for `slot` of `vector`, reading `name`
    pub fn new(vector: Arc<FeedbackVector>, slot: FeedbackSlot, name: PropertyKey) -> Self {
        Self { vector, slot, name }
    }

    /// Feedback slot
    pub fn slot(&self) -> FeedbackSlot {
        self.slot
    }

    /// Current cache state
    pub fn state(&self) -> VmResult<InlineCacheState> {
        Ok(self.vector.state(self.slot)?)
    }

    /// Perform the load
    pub fn load<R: RuntimeFallback>(
        &self,
        ic: &IcDispatcher<R>,
        ctx: &mut VmContext,
        receiver: &Value,
    ) -> VmResult<Value> {
        if let Some(shape) = receiver_shape(receiver)
            && let Some(handler) = self.vector.lookup(self.slot, shape, proto_epoch())?
            && let Some(value) = apply_load_handler(ic.runtime(), ctx, shape, handler, receiver, &self.name)?
        {
            return Ok(value);
        }

        let op = LoadWithVector {
            receiver,
            key: &self.name,
            slot: self.slot,
            vector: &self.vector,
        };
        if self.vector.state(self.slot)?.is_saturated() {
            if is_dictionary_receiver(receiver) {
                return ic.load_ic_normal(ctx, op);
            }
            return ic.load_ic_slow(ctx, receiver, &self.name);
        }
        ic.load_ic_miss(ctx, op)
    }
}

/// `receiver[key]`
#[derive(Debug, Clone)]
pub struct KeyedLoadSite {
    vector: Arc<FeedbackVector>,
    slot: FeedbackSlot,
}

impl KeyedLoadSite {
    /// Site for `slot` of `vector`
    pub fn new(vector: Arc<FeedbackVector>, slot: FeedbackSlot) -> Self {
        Self { vector, slot }
    }

    /// Feedback slot
    pub fn slot(&self) -> FeedbackSlot {
        self.slot
    }

    /// Current cache state
    pub fn state(&self) -> VmResult<InlineCacheState> {
        Ok(self.vector.state(self.slot)?)
    }

    /// Perform the load
    pub fn load<R: RuntimeFallback>(
        &self,
        ic: &IcDispatcher<R>,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value> {
        let property = PropertyKey::from_value(key);
        if let Some(shape) = receiver_shape(receiver)
            && let Some(handler) = self
                .vector
                .lookup_keyed(self.slot, property.key_id(), shape, proto_epoch())?
            && let Some(value) = apply_load_handler(ic.runtime(), ctx, shape, handler, receiver, &property)?
        {
            return Ok(value);
        }

        if self.vector.state(self.slot)?.is_saturated() {
            return ic.keyed_load_ic_slow(ctx, receiver, key);
        }
        ic.keyed_load_ic_miss(
            ctx,
            LoadWithVector {
                receiver,
                key,
                slot: self.slot,
                vector: &self.vector,
            },
        )
    }
}

/// A global variable read
#[derive(Debug, Clone)]
pub struct GlobalLoadSite {
    vector: Arc<FeedbackVector>,
    slot: FeedbackSlot,
    name: PropertyKey,
}

impl GlobalLoadSite {
    /// Site for `slot` of `vector`, reading global `name`
    pub fn new(vector: Arc<FeedbackVector>, slot: FeedbackSlot, name: PropertyKey) -> Self {
        Self { vector, slot, name }
    }

    /// Feedback slot
    pub fn slot(&self) -> FeedbackSlot {
        self.slot
    }

    /// Current cache state
    pub fn state(&self) -> VmResult<InlineCacheState> {
        Ok(self.vector.state(self.slot)?)
    }

    /// Perform the load
    pub fn load<R: RuntimeFallback>(&self, ic: &IcDispatcher<R>, ctx: &mut VmContext) -> VmResult<Value> {
        let global = Value::Object(ctx.global().clone());
        if let Some(shape) = receiver_shape(&global)
            && let Some(handler) = self.vector.lookup(self.slot, shape, proto_epoch())?
        {
            match handler {
                // Undeclared names must throw, so these go the slow way
                Handler::Generic | Handler::AccessorForward => {
                    return ic.load_global_ic_slow(ctx, &self.name);
                }
                _ => {
                    if let Some(value) =
                        apply_load_handler(ic.runtime(), ctx, shape, handler, &global, &self.name)?
                    {
                        return Ok(value);
                    }
                }
            }
        }

        if self.vector.state(self.slot)?.is_saturated() {
            return ic.load_global_ic_slow(ctx, &self.name);
        }
        ic.load_global_ic_miss(
            ctx,
            LoadGlobalWithVector {
                name: &self.name,
                slot: self.slot,
                vector: &self.vector,
            },
        )
    }
}

/// `receiver.name = value`
#[derive(Debug, Clone)]
pub struct StoreSite {
    vector: Arc<FeedbackVector>,
    slot: FeedbackSlot,
    name: PropertyKey,
}

impl StoreSite {
    /// Site for `slot` of `vector`, writing `name`
    pub fn new(vector: Arc<FeedbackVector>, slot: FeedbackSlot, name: PropertyKey) -> Self {
        Self { vector, slot, name }
    }

    /// Feedback slot
    pub fn slot(&self) -> FeedbackSlot {
        self.slot
    }

    /// Current cache state
    pub fn state(&self) -> VmResult<InlineCacheState> {
        Ok(self.vector.state(self.slot)?)
    }

    /// Perform the store; returns the stored value
    pub fn store<R: RuntimeFallback>(
        &self,
        ic: &IcDispatcher<R>,
        ctx: &mut VmContext,
        receiver: &Value,
        value: Value,
    ) -> VmResult<Value> {
        let mode = self.vector.expect_store(self.slot)?;
        if let Some(shape) = receiver_shape(receiver)
            && let Some(handler) = self.vector.lookup(self.slot, shape, proto_epoch())?
            && let Some(stored) =
                apply_store_handler(ctx, shape, handler, receiver, &self.name, value.clone(), mode)?
        {
            return Ok(stored);
        }

        let op = StoreWithVector {
            receiver,
            key: &self.name,
            value,
            slot: self.slot,
            vector: &self.vector,
        };
        if self.vector.state(self.slot)?.is_saturated() && is_dictionary_receiver(receiver) {
            return ic.store_ic_normal(ctx, op);
        }
        ic.store_ic_miss(ctx, op)
    }
}

/// `receiver[key] = value`
#[derive(Debug, Clone)]
pub struct KeyedStoreSite {
    vector: Arc<FeedbackVector>,
    slot: FeedbackSlot,
}

impl KeyedStoreSite {
    /// Site for `slot` of `vector`
    pub fn new(vector: Arc<FeedbackVector>, slot: FeedbackSlot) -> Self {
        Self { vector, slot }
    }

    /// Feedback slot
    pub fn slot(&self) -> FeedbackSlot {
        self.slot
    }

    /// Current cache state
    pub fn state(&self) -> VmResult<InlineCacheState> {
        Ok(self.vector.state(self.slot)?)
    }

    /// Perform the store; returns the stored value
    pub fn store<R: RuntimeFallback>(
        &self,
        ic: &IcDispatcher<R>,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<Value> {
        let mode = self.vector.expect_store(self.slot)?;
        let property = PropertyKey::from_value(key);
        if let Some(shape) = receiver_shape(receiver)
            && let Some(handler) = self
                .vector
                .lookup_keyed(self.slot, property.key_id(), shape, proto_epoch())?
            && let Some(stored) =
                apply_store_handler(ctx, shape, handler, receiver, &property, value.clone(), mode)?
        {
            return Ok(stored);
        }

        if self.vector.state(self.slot)?.is_saturated() {
            return match mode {
                LanguageMode::Sloppy => ic.keyed_store_ic_megamorphic(ctx, receiver, key, value),
                LanguageMode::Strict => ic.keyed_store_ic_megamorphic_strict(ctx, receiver, key, value),
            };
        }
        ic.keyed_store_ic_miss(
            ctx,
            StoreWithVector {
                receiver,
                key,
                value,
                slot: self.slot,
                vector: &self.vector,
            },
        )
    }
}
