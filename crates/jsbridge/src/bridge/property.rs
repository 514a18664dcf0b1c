//! Native accessor properties.

use crate::bridge::callbacks::{self, Capability, HostGetter, HostSetter};
use crate::error::Result;
use crate::runtime::context::Context;
use crate::value::Value;
use boa_engine::{property::PropertyDescriptor as EngineDescriptor, JsString, JsValue};
use std::fmt;
use std::rc::Rc;

/// A getter and optional setter bound to one property name.
///
/// Both run synchronously whenever script reads or writes the property.
/// Without a setter the property is read-only: sloppy-mode writes are
/// ignored and strict-mode writes throw a `TypeError`.
pub struct PropertyDescriptor {
    getter: Rc<HostGetter>,
    setter: Option<Rc<HostSetter>>,
    enumerable: bool,
    configurable: bool,
}

impl PropertyDescriptor {
    /// An enumerable, configurable, read-only accessor read through `getter`.
    /// Without a setter, script writes are rejected.
    pub fn getter<G>(getter: G) -> Self
    where
        G: Fn(&Context, &Value) -> Result<Value> + 'static,
    {
        Self {
            getter: Rc::new(getter),
            setter: None,
            enumerable: true,
            configurable: true,
        }
    }

    /// Accepts writes through `setter`.
    pub fn with_setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&Context, &Value, &Value) -> Result<()> + 'static,
    {
        self.setter = Some(Rc::new(setter));
        self
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    /// Returns true if no setter was given.
    pub fn is_read_only(&self) -> bool {
        self.setter.is_none()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("setter", &self.setter.is_some())
            .field("enumerable", &self.enumerable)
            .field("configurable", &self.configurable)
            .finish()
    }
}

impl Value {
    /// Installs `descriptor` as an accessor property `name` on this object.
    ///
    /// Redefining a configurable property replaces its accessors; the
    /// replaced closures are released once the engine collects them.
    ///
    /// # Errors
    ///
    /// - `Error::PropertyAccessNonObject` if this value is not an object
    /// - `Error::Evaluation` if the engine refuses the definition (for
    ///   example a non-configurable existing property)
    pub fn define_property(&self, name: &str, descriptor: PropertyDescriptor) -> Result<()> {
        let object = self.object()?;
        let context = self.context()?;
        let read_only = descriptor.is_read_only();

        let getter = callbacks::register(
            &context,
            &format!("get {name}"),
            0,
            Capability::Getter(descriptor.getter),
        )?;
        let setter: JsValue = match descriptor.setter {
            Some(setter) => {
                callbacks::register(&context, &format!("set {name}"), 1, Capability::Setter(setter))?.into()
            }
            None => JsValue::undefined(),
        };

        let engine_descriptor = EngineDescriptor::builder()
            .get(getter)
            .set(setter)
            .enumerable(descriptor.enumerable)
            .configurable(descriptor.configurable)
            .build();

        context.try_enter(|engine| {
            object.define_property_or_throw(JsString::from(name), engine_descriptor, engine)
        })?;

        tracing::debug!(
            property = name,
            read_only,
            "Native accessor installed"
        );
        Ok(())
    }
}
