//! Value handles.
//!
//! A [`Value`] pairs an engine value with a weak reference to the
//! [`Context`] it came from. The engine's collector decides when the
//! underlying value dies; holding a `Value` roots it, but a `Value` never
//! keeps its context alive.

mod json;

use crate::error::{Error, Result};
use crate::runtime::context::{Context, ContextInner};
use boa_engine::{
    object::{
        builtins::{JsArray, JsArrayBuffer, JsDate, JsPromise, JsTypedArray},
        JsObject,
    },
    JsString, JsValue,
};
use std::fmt;
use std::rc::Weak;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Value {
    raw: JsValue,
    context: Weak<ContextInner>,
}

impl Value {
    pub(crate) fn from_raw(raw: JsValue, context: Weak<ContextInner>) -> Self {
        Self { raw, context }
    }

    /// The engine value behind this handle.
    pub fn as_js_value(&self) -> &JsValue {
        &self.raw
    }

    /// Unwraps the handle into the engine value.
    pub fn into_js_value(self) -> JsValue {
        self.raw
    }

    pub(crate) fn into_raw(self) -> JsValue {
        self.raw
    }

    /// The owning context.
    ///
    /// # Errors
    ///
    /// `Error::ContextReleased` once every alias of the context is dropped.
    pub fn context(&self) -> Result<Context> {
        self.context
            .upgrade()
            .map(Context::from_inner)
            .ok_or(Error::ContextReleased)
    }

    pub(crate) fn object(&self) -> Result<JsObject> {
        self.raw
            .as_object()
            .map(|object| object.clone())
            .ok_or(Error::PropertyAccessNonObject)
    }

    // ========================================================================
    // Type predicates
    // ========================================================================

    pub fn is_undefined(&self) -> bool {
        self.raw.is_undefined()
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    pub fn is_boolean(&self) -> bool {
        self.raw.is_boolean()
    }

    pub fn is_number(&self) -> bool {
        self.raw.is_number()
    }

    pub fn is_string(&self) -> bool {
        self.raw.is_string()
    }

    pub fn is_symbol(&self) -> bool {
        self.raw.is_symbol()
    }

    pub fn is_bigint(&self) -> bool {
        self.raw.is_bigint()
    }

    pub fn is_object(&self) -> bool {
        self.raw.is_object()
    }

    pub fn is_array(&self) -> bool {
        self.raw.as_object().is_some_and(|object| object.is_array())
    }

    /// True for anything callable, including classes and bound functions.
    pub fn is_function(&self) -> bool {
        self.raw.as_object().is_some_and(|object| object.is_callable())
    }

    pub fn is_constructor(&self) -> bool {
        self.raw.as_object().is_some_and(|object| object.is_constructor())
    }

    pub fn is_array_buffer(&self) -> bool {
        self.raw
            .as_object()
            .is_some_and(|object| JsArrayBuffer::from_object(object.clone()).is_ok())
    }

    pub fn is_typed_array(&self) -> bool {
        self.raw
            .as_object()
            .is_some_and(|object| JsTypedArray::from_object(object.clone()).is_ok())
    }

    /// True only for native promises. See [`Value::is_thenable`] for the
    /// structural check used by the async adapter.
    pub fn is_promise(&self) -> bool {
        self.raw
            .as_object()
            .is_some_and(|object| JsPromise::from_object(object.clone()).is_ok())
    }

    pub fn is_date(&self) -> bool {
        self.raw
            .as_object()
            .is_some_and(|object| JsDate::from_object(object.clone()).is_ok())
    }

    /// Promise-shaped: a non-callable object that is a native promise or
    /// exposes a `then` property.
    pub fn is_thenable(&self) -> bool {
        if !self.is_object() || self.is_function() {
            return false;
        }
        self.is_promise() || self.has("then").unwrap_or(false)
    }

    // ========================================================================
    // Coercions
    // ========================================================================

    /// `ToNumber`, or `None` if the conversion throws (symbols, throwing
    /// `valueOf`) or the context is gone.
    pub fn number_value(&self) -> Option<f64> {
        if let Some(number) = self.raw.as_number() {
            return Some(number);
        }
        let context = self.context().ok()?;
        context.enter(|engine| self.raw.to_number(engine).ok()).ok().flatten()
    }

    /// `ToInt32`, or `None` if the conversion throws or the context is gone.
    pub fn int32_value(&self) -> Option<i32> {
        let context = self.context().ok()?;
        context.enter(|engine| self.raw.to_i32(engine).ok()).ok().flatten()
    }

    /// `ToString`, or `None` if the conversion throws or the context is gone.
    pub fn string_value(&self) -> Option<String> {
        if let Some(string) = self.raw.as_string() {
            return Some(string.to_std_string_escaped());
        }
        let context = self.context().ok()?;
        context
            .enter(|engine| self.raw.to_string(engine).ok())
            .ok()
            .flatten()
            .map(|string| string.to_std_string_escaped())
    }

    /// `ToBoolean`. Never fails.
    pub fn boolean_value(&self) -> Option<bool> {
        Some(self.raw.to_boolean())
    }

    /// The time value of a `Date`, or `None` for anything else and for
    /// invalid dates.
    pub fn date_value(&self) -> Option<SystemTime> {
        if !self.is_date() {
            return None;
        }
        let millis = self.number_value().filter(|millis| millis.is_finite())?;
        let offset = Duration::from_millis(millis.abs() as u64);
        if millis >= 0.0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        self.raw.strict_equals(&other.raw)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Calls this value with `this_value` as receiver (`undefined` if `None`).
    ///
    /// # Errors
    ///
    /// - `Error::CallOnNonFunction` if this value is not callable
    /// - `Error::Evaluation` carrying the thrown value if the call throws
    pub fn call(&self, args: &[Value], this_value: Option<&Value>) -> Result<Value> {
        let function = self
            .raw
            .as_object()
            .filter(|object| object.is_callable())
            .ok_or(Error::CallOnNonFunction)?;
        let context = self.context()?;
        let args = raw_args(args);
        let this_value = this_value.map_or_else(JsValue::undefined, |this| this.raw.clone());

        tracing::trace!(argc = args.len(), "Calling function value");
        context
            .try_enter(|engine| function.call(&this_value, &args, engine))
            .map(|result| context.wrap(result))
    }

    /// `new this(...args)`.
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        let constructor = self
            .raw
            .as_object()
            .filter(|object| object.is_constructor())
            .ok_or(Error::CallOnNonFunction)?;
        let context = self.context()?;
        let args = raw_args(args);

        context
            .try_enter(|engine| constructor.construct(&args, None, engine))
            .map(|object| context.wrap(object.into()))
    }

    /// `this instanceof constructor`.
    pub fn is_instance_of(&self, constructor: &Value) -> Result<bool> {
        let context = self.context()?;
        context.try_enter(|engine| self.raw.instance_of(&constructor.raw, engine))
    }

    // ========================================================================
    // Property access
    // ========================================================================

    /// Reads `name`, running getters and walking the prototype chain.
    ///
    /// # Errors
    ///
    /// - `Error::PropertyAccessNonObject` if this is not an object
    /// - `Error::Evaluation` if a getter throws
    pub fn get(&self, name: &str) -> Result<Value> {
        let object = self.object()?;
        let context = self.context()?;
        context
            .try_enter(|engine| object.get(JsString::from(name), engine))
            .map(|value| context.wrap(value))
    }

    /// Assigns `name`, failing with `Error::Evaluation` if the engine rejects
    /// the write (read-only or accessor without a setter).
    pub fn set(&self, name: &str, value: &Value) -> Result<()> {
        let object = self.object()?;
        let context = self.context()?;
        context
            .try_enter(|engine| object.set(JsString::from(name), value.raw.clone(), true, engine))
            .map(drop)
    }

    /// Removes `name`. Returns `Ok(true)` if the property no longer exists.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let object = self.object()?;
        let context = self.context()?;
        context.try_enter(|engine| object.delete_property_or_throw(JsString::from(name), engine))
    }

    /// `name in this`, including inherited properties.
    pub fn has(&self, name: &str) -> Result<bool> {
        let object = self.object()?;
        let context = self.context()?;
        context.try_enter(|engine| object.has_property(JsString::from(name), engine))
    }

    /// Own enumerable string keys, in `Object.keys` order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let object = self.object()?;
        let context = self.context()?;
        context.try_enter(|engine| {
            let object_constructor = engine.intrinsics().constructors().object().constructor();
            let keys_fn = object_constructor.get(JsString::from("keys"), engine)?;
            let keys = match keys_fn.as_object() {
                Some(keys_fn) => keys_fn.call(&object_constructor.clone().into(), &[object.clone().into()], engine)?,
                None => return Ok(Vec::new()),
            };
            let Some(keys) = keys.as_object() else {
                return Ok(Vec::new());
            };
            let keys = JsArray::from_object(keys.clone())?;

            let length = keys.length(engine)?;
            let mut names = Vec::with_capacity(length as usize);
            for i in 0..length {
                let key = keys.get(i, engine)?;
                names.push(key.to_string(engine)?.to_std_string_escaped());
            }
            Ok(names)
        })
    }

    /// Reads element `index`. Same failures as [`Value::get`].
    pub fn get_index(&self, index: u32) -> Result<Value> {
        let object = self.object()?;
        let context = self.context()?;
        context
            .try_enter(|engine| object.get(index, engine))
            .map(|value| context.wrap(value))
    }

    /// Writes element `index`. Same failures as [`Value::set`].
    pub fn set_index(&self, index: u32, value: &Value) -> Result<()> {
        let object = self.object()?;
        let context = self.context()?;
        context
            .try_enter(|engine| object.set(index, value.raw.clone(), true, engine))
            .map(drop)
    }

    /// Appends `value` to an array.
    ///
    /// # Errors
    ///
    /// `Error::AddToNonArray` unless this value is an `Array`.
    pub fn push(&self, value: &Value) -> Result<()> {
        let array = self
            .raw
            .as_object()
            .filter(|object| object.is_array())
            .ok_or(Error::AddToNonArray)?;
        let context = self.context()?;
        context
            .try_enter(|engine| {
                let array = JsArray::from_object(array.clone())?;
                array.push(value.raw.clone(), engine)
            })
            .map(drop)
    }

    /// Array length, or `None` for non-arrays.
    pub fn length(&self) -> Option<u64> {
        let array = self.raw.as_object().filter(|object| object.is_array())?;
        let context = self.context().ok()?;
        context
            .try_enter(|engine| JsArray::from_object(array.clone())?.length(engine))
            .ok()
    }
}

fn raw_args(args: &[Value]) -> Vec<JsValue> {
    args.iter().map(|arg| arg.raw.clone()).collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw.display())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&format_args!("{}", self.raw.display())).finish()
    }
}
