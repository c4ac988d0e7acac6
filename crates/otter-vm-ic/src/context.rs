//! Execution context
//!
//! Holds what a property access needs besides its operands: the global
//! object, the write barrier new objects report to, the configuration and
//! the accessor nesting depth.

use std::sync::Arc;

use otter_vm_gc::{WriteBarrier, WriteBarrierBuffer};

use crate::config::IcConfig;
use crate::error::{VmError, VmResult};
use crate::function::JsFunction;
use crate::gc::GcRef;
use crate::object::JsObject;
use crate::value::Value;

/// VM execution context
pub struct VmContext {
    global: GcRef<JsObject>,
    barrier: Arc<dyn WriteBarrier>,
    config: IcConfig,
    call_depth: usize,
}

impl VmContext {
    /// Create a context with a buffered write barrier sized from `config`
    pub fn new(config: IcConfig) -> Self {
        let barrier: Arc<dyn WriteBarrier> =
            Arc::new(WriteBarrierBuffer::with_capacity(config.barrier_buffer_size));
        Self::with_barrier(config, barrier)
    }

    /// Create a context reporting to `barrier`
    pub fn with_barrier(config: IcConfig, barrier: Arc<dyn WriteBarrier>) -> Self {
        let global = GcRef::new(JsObject::new(None, Arc::clone(&barrier)));
        Self {
            global,
            barrier,
            config,
            call_depth: 0,
        }
    }

    /// Global object
    pub fn global(&self) -> &GcRef<JsObject> {
        &self.global
    }

    /// Configuration
    pub fn config(&self) -> &IcConfig {
        &self.config
    }

    /// Write barrier
    pub fn barrier(&self) -> &Arc<dyn WriteBarrier> {
        &self.barrier
    }

    /// Current accessor nesting depth
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    /// Allocate an ordinary object
    pub fn new_object(&self, prototype: Option<GcRef<JsObject>>) -> GcRef<JsObject> {
        GcRef::new(JsObject::new(prototype, Arc::clone(&self.barrier)))
    }

    /// Call into user code.
    ///
    /// Fails with [`VmError::StackOverflow`] past `max_call_depth` nested
    /// calls. Errors from the callee propagate unchanged.
    pub fn call_function(
        &mut self,
        func: &GcRef<JsFunction>,
        this: &Value,
        args: &[Value],
    ) -> VmResult<Value> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        self.call_depth += 1;
        let result = func.invoke(self, this, args);
        self.call_depth -= 1;
        result
    }
}

impl Default for VmContext {
    fn default() -> Self {
        Self::new(IcConfig::default())
    }
}

impl std::fmt::Debug for VmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("global", &self.global)
            .field("config", &self.config)
            .field("call_depth", &self.call_depth)
            .finish()
    }
}
