//! The capability table.
//!
//! Host closures never cross into the engine heap. Each one is stored in its
//! context's table under a numeric id, and the engine-side function object
//! captures only `(weak context, id)`. Calls go through [`dispatch`], which
//! looks the closure up, parks the engine for re-entrant access and converts
//! arguments and results.
//!
//! An entry lives until the engine collects the function object that refers
//! to it, or until the context is released, whichever comes first.

use crate::error::{Error, Result};
use crate::runtime::context::{Context, ContextInner};
use crate::value::Value;
use boa_engine::{
    native_function::NativeFunction,
    object::{FunctionObjectBuilder, JsObject},
    Context as Engine, JsNativeError, JsResult, JsString, JsValue,
};
use boa_gc::{Finalize, Trace};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub(crate) type CapabilityId = u64;

pub(crate) type HostFunction = dyn Fn(&Context, &Value, &[Value]) -> Result<Value>;
pub(crate) type HostGetter = dyn Fn(&Context, &Value) -> Result<Value>;
pub(crate) type HostSetter = dyn Fn(&Context, &Value, &Value) -> Result<()>;

#[derive(Clone)]
pub(crate) enum Capability {
    Function(Rc<HostFunction>),
    Getter(Rc<HostGetter>),
    Setter(Rc<HostSetter>),
}

#[derive(Default)]
pub(crate) struct CapabilityTable {
    next_id: CapabilityId,
    entries: HashMap<CapabilityId, Capability>,
}

impl CapabilityTable {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, capability: Capability) -> CapabilityId {
        self.next_id += 1;
        self.entries.insert(self.next_id, capability);
        self.next_id
    }

    fn get(&self, id: CapabilityId) -> Option<Capability> {
        self.entries.get(&id).cloned()
    }

    fn remove(&mut self, id: CapabilityId) -> bool {
        self.entries.remove(&id).is_some()
    }
}

/// What a native function object captures.
#[derive(Trace)]
pub(crate) struct CapabilityRef {
    #[unsafe_ignore_trace]
    context: Weak<ContextInner>,
    id: CapabilityId,
}

impl Finalize for CapabilityRef {
    fn finalize(&self) {
        let Some(inner) = self.context.upgrade() else {
            return;
        };
        // Runs during collection; a table borrowed at that moment keeps the
        // entry until the context is released.
        if let Ok(mut table) = inner.capabilities.try_borrow_mut() {
            if table.remove(self.id) {
                tracing::trace!(id = self.id, "Capability released by collector");
            }
        }
    }
}

/// Stores `capability` and builds the function object that invokes it.
pub(crate) fn register(
    context: &Context,
    name: &str,
    length: usize,
    capability: Capability,
) -> Result<JsObject> {
    let id = context.inner.capabilities.borrow_mut().insert(capability);
    let captures = CapabilityRef {
        context: context.downgrade(),
        id,
    };

    let built = context.enter(|engine| {
        let realm = engine.realm().clone();
        FunctionObjectBuilder::new(
            &realm,
            NativeFunction::from_copy_closure_with_captures(dispatch, captures),
        )
        .name(JsString::from(name))
        .length(length)
        .build()
    });

    match built {
        Ok(function) => {
            tracing::trace!(id, name, "Capability registered");
            Ok(function.into())
        }
        Err(e) => {
            context.inner.capabilities.borrow_mut().remove(id);
            Err(e)
        }
    }
}

fn dispatch(
    this: &JsValue,
    args: &[JsValue],
    capability: &CapabilityRef,
    engine: &mut Engine,
) -> JsResult<JsValue> {
    let inner = capability.context.upgrade().ok_or_else(|| {
        JsNativeError::typ().with_message(Error::ContextReleased.to_string())
    })?;
    let context = Context::from_inner(inner);

    let entry = context.inner.capabilities.borrow().get(capability.id);
    let entry = entry.ok_or_else(|| {
        JsNativeError::typ().with_message("Native callback has been released")
    })?;

    let this = context.wrap(this.clone());
    let args: Vec<Value> = args.iter().map(|arg| context.wrap(arg.clone())).collect();

    let outcome = context.inner.vm.inner.engine.reenter(engine, || match &entry {
        Capability::Function(function) => function(&context, &this, &args),
        Capability::Getter(getter) => getter(&context, &this),
        Capability::Setter(setter) => {
            let value = args.first().cloned().unwrap_or_else(|| context.undefined());
            setter(&context, &this, &value).map(|()| context.undefined())
        }
    });

    outcome.map(Value::into_raw).map_err(Error::into_js_error)
}
