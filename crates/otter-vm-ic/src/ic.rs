//! IC dispatchers
//!
//! Entry points entered when a site's cached handler does not apply. Most
//! of them only forward to the [`RuntimeFallback`] with a kind-specific
//! argument list. The `normal` variants first try the dictionary fast path
//! inline and escalate to the miss handler only when it cannot complete the
//! access. Escalation is always a tail call; a fast path is never retried.
//!
//! | Dispatcher                            | Fast path | Escalates to          |
//! |---------------------------------------|-----------|-----------------------|
//! | `load_ic_miss` / `keyed_load_ic_miss` | -         | miss (load / keyed)   |
//! | `load_global_ic_miss`                 | -         | miss (global)         |
//! | `*_slow`                              | -         | plain get / store     |
//! | `load_ic_normal`                      | dict load | miss on not found     |
//! | `store_ic_miss` / `keyed_store_ic_miss` | -       | store miss            |
//! | `store_ic_normal`                     | dict store| miss on any refusal   |
//! | `keyed_store_ic_megamorphic{,_strict}`| -         | generic keyed store   |

use otter_vm_feedback::{FeedbackSlot, FeedbackVector, LanguageMode};

use crate::context::VmContext;
use crate::error::{VmError, VmResult};
use crate::fast_path::{DictionaryLoad, DictionaryStore, load_from_dictionary, store_to_dictionary};
use crate::property::PropertyKey;
use crate::runtime::{GenericRuntime, RuntimeFallback};
use crate::value::Value;

/// Operands of a load dispatcher: `K` is [`PropertyKey`] for named loads and
/// [`Value`] for keyed loads
#[derive(Debug)]
pub struct LoadWithVector<'a, K> {
    /// Object being read
    pub receiver: &'a Value,
    /// Property name or computed key
    pub key: &'a K,
    /// Feedback slot of the site
    pub slot: FeedbackSlot,
    /// Feedback vector holding the slot
    pub vector: &'a FeedbackVector,
}

impl<K> Clone for LoadWithVector<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for LoadWithVector<'_, K> {}

/// Operands of a store dispatcher
#[derive(Debug, Clone)]
pub struct StoreWithVector<'a, K> {
    /// Object being written
    pub receiver: &'a Value,
    /// Property name or computed key
    pub key: &'a K,
    /// Value to store
    pub value: Value,
    /// Feedback slot of the site
    pub slot: FeedbackSlot,
    /// Feedback vector holding the slot
    pub vector: &'a FeedbackVector,
}

/// Operands of a global load dispatcher
#[derive(Debug, Clone, Copy)]
pub struct LoadGlobalWithVector<'a> {
    /// Global name
    pub name: &'a PropertyKey,
    /// Feedback slot of the site
    pub slot: FeedbackSlot,
    /// Feedback vector holding the slot
    pub vector: &'a FeedbackVector,
}

/// The IC dispatchers, bound to a runtime fallback
#[derive(Debug, Clone, Default)]
pub struct IcDispatcher<R = GenericRuntime> {
    runtime: R,
}

impl<R: RuntimeFallback> IcDispatcher<R> {
    /// Bind dispatchers to `runtime`
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    /// The runtime fallback
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Named load miss
    pub fn load_ic_miss(&self, ctx: &mut VmContext, op: LoadWithVector<'_, PropertyKey>) -> VmResult<Value> {
        self.runtime.miss_load(ctx, op.receiver, op.key, op.slot, op.vector)
    }

    /// Named load for a site that stopped caching
    pub fn load_ic_slow(&self, ctx: &mut VmContext, receiver: &Value, name: &PropertyKey) -> VmResult<Value> {
        self.runtime.get_property(ctx, receiver, name)
    }

    /// Named load from a dictionary-mode receiver
    pub fn load_ic_normal(&self, ctx: &mut VmContext, op: LoadWithVector<'_, PropertyKey>) -> VmResult<Value> {
        if let Some(holder) = op.receiver.as_object() {
            match load_from_dictionary(ctx, op.receiver, holder, op.key)? {
                DictionaryLoad::Found(value) => {
                    tracing::trace!(slot = %op.slot, key = %op.key, "dictionary load hit");
                    return Ok(value);
                }
                DictionaryLoad::NotFound | DictionaryLoad::NotDictionary => {}
            }
        }
        tracing::trace!(slot = %op.slot, key = %op.key, "load_ic_normal escalates to miss");
        self.load_ic_miss(ctx, op)
    }

    /// Keyed load miss
    pub fn keyed_load_ic_miss(&self, ctx: &mut VmContext, op: LoadWithVector<'_, Value>) -> VmResult<Value> {
        self.runtime.miss_keyed_load(ctx, op.receiver, op.key, op.slot, op.vector)
    }

    /// Keyed load for a site that stopped caching
    pub fn keyed_load_ic_slow(&self, ctx: &mut VmContext, receiver: &Value, key: &Value) -> VmResult<Value> {
        self.runtime.keyed_get_property(ctx, receiver, key)
    }

    /// Global load miss
    pub fn load_global_ic_miss(&self, ctx: &mut VmContext, op: LoadGlobalWithVector<'_>) -> VmResult<Value> {
        self.runtime.miss_load_global(ctx, op.name, op.slot, op.vector)
    }

    /// Global load for a site that stopped caching
    pub fn load_global_ic_slow(&self, ctx: &mut VmContext, name: &PropertyKey) -> VmResult<Value> {
        self.runtime.slow_load_global(ctx, name)
    }

    /// Named store miss. Operands reach the runtime as
    /// `(value, slot, vector, receiver, name)`.
    pub fn store_ic_miss(&self, ctx: &mut VmContext, op: StoreWithVector<'_, PropertyKey>) -> VmResult<Value> {
        self.runtime
            .miss_store(ctx, op.value, op.slot, op.vector, op.receiver, op.key)
    }

    /// Named store to a dictionary-mode receiver
    pub fn store_ic_normal(&self, ctx: &mut VmContext, op: StoreWithVector<'_, PropertyKey>) -> VmResult<Value> {
        if let Some(holder) = op.receiver.as_object() {
            match store_to_dictionary(holder, op.key, op.value.clone())? {
                DictionaryStore::Stored => {
                    tracing::trace!(slot = %op.slot, key = %op.key, "dictionary store hit");
                    return Ok(op.value);
                }
                DictionaryStore::Disqualified(details) => {
                    tracing::trace!(slot = %op.slot, key = %op.key, ?details, "dictionary store refused");
                }
                DictionaryStore::NotFound | DictionaryStore::NotDictionary => {}
            }
        }
        self.store_ic_miss(ctx, op)
    }

    /// Keyed store miss
    pub fn keyed_store_ic_miss(&self, ctx: &mut VmContext, op: StoreWithVector<'_, Value>) -> VmResult<Value> {
        self.runtime
            .miss_keyed_store(ctx, op.value, op.slot, op.vector, op.receiver, op.key)
    }

    /// Keyed store that completes without touching the slot's state
    pub fn keyed_store_ic_slow(&self, ctx: &mut VmContext, op: StoreWithVector<'_, Value>) -> VmResult<Value> {
        self.runtime
            .slow_keyed_store(ctx, op.value, op.slot, op.vector, op.receiver, op.key)
    }

    /// Megamorphic keyed store, sloppy mode
    pub fn keyed_store_ic_megamorphic(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<Value> {
        self.runtime
            .generic_keyed_store(ctx, LanguageMode::Sloppy, receiver, key, value)
    }

    /// Megamorphic keyed store, strict mode
    pub fn keyed_store_ic_megamorphic_strict(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<Value> {
        self.runtime
            .generic_keyed_store(ctx, LanguageMode::Strict, receiver, key, value)
    }

    /// Finish a getter call whose optimized frame was abandoned
    pub fn load_ic_getter_for_deopt(&self, ctx: &mut VmContext, receiver: &Value, getter: &Value) -> VmResult<Value> {
        match getter {
            Value::Function(func) => ctx.call_function(func, receiver, &[]),
            Value::Undefined => Ok(Value::undefined()),
            other => Err(VmError::type_error(format!(
                "{} is not a function",
                other.to_display_string()
            ))),
        }
    }

    /// Finish a setter call whose optimized frame was abandoned.
    ///
    /// Returns the assigned value, not the setter's result.
    pub fn store_ic_setter_for_deopt(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        setter: &Value,
        value: Value,
    ) -> VmResult<Value> {
        match setter {
            Value::Function(func) => {
                ctx.call_function(func, receiver, std::slice::from_ref(&value))?;
                Ok(value)
            }
            Value::Undefined => Ok(value),
            other => Err(VmError::type_error(format!(
                "{} is not a function",
                other.to_display_string()
            ))),
        }
    }
}
