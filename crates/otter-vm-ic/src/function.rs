//! Native callables
//!
//! Accessor halves and proxy traps are plain native functions. They receive
//! the context, so they can run arbitrary property accesses of their own.

use std::sync::Arc;

use otter_vm_gc::{GcHeader, tags};

use crate::context::VmContext;
use crate::error::VmResult;
use crate::gc::GcRef;
use crate::string::JsString;
use crate::value::Value;

/// Native function handler type: `(context, this, arguments)`
pub type NativeFn = Arc<dyn Fn(&mut VmContext, &Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// A callable heap cell
pub struct JsFunction {
    header: GcHeader,
    name: Arc<JsString>,
    func: NativeFn,
}

impl JsFunction {
    /// Create a native function
    pub fn native<F>(name: &str, f: F) -> GcRef<Self>
    where
        F: Fn(&mut VmContext, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        GcRef::new(Self {
            header: GcHeader::new(tags::FUNCTION),
            name: JsString::intern(name),
            func: Arc::new(f),
        })
    }

    /// Function name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// GC header of the function cell
    pub fn header(&self) -> &GcHeader {
        &self.header
    }

    /// Run the function body. Callers go through
    /// [`VmContext::call_function`], which enforces the nesting limit.
    pub(crate) fn invoke(&self, ctx: &mut VmContext, this: &Value, args: &[Value]) -> VmResult<Value> {
        (self.func)(ctx, this, args)
    }
}

impl std::fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsFunction").field("name", &self.name()).finish()
    }
}
