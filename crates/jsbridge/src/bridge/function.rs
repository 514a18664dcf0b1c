use crate::bridge::callbacks::{self, Capability};
use crate::error::Result;
use crate::runtime::context::Context;
use crate::value::Value;
use std::rc::Rc;

impl Context {
    /// Wraps a host closure as a JavaScript function.
    ///
    /// The closure receives the context, the receiver (`this`) and the
    /// arguments. Returning `Err(Error::Evaluation(v))` throws `v` into the
    /// calling script; any other error is thrown as a `TypeError` carrying
    /// the error message.
    ///
    /// The closure is owned by this context and is released when the engine
    /// collects the function object, or when the context is released. A
    /// closure that captures a clone of the context keeps it alive; use the
    /// `ctx` argument instead.
    ///
    /// ```no_run
    /// # use jsbridge::{Context, Vm};
    /// # let vm = Vm::new()?;
    /// # let ctx = Context::new(&vm)?;
    /// let greet = ctx.new_function("greet", |ctx, _this, args| {
    ///     let name = args.first().and_then(|v| v.string_value()).unwrap_or_default();
    ///     Ok(ctx.string(&format!("hello, {name}")))
    /// })?;
    /// ctx.global().set("greet", &greet)?;
    /// # Ok::<(), jsbridge::Error>(())
    /// ```
    pub fn new_function<F>(&self, name: &str, function: F) -> Result<Value>
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<Value> + 'static,
    {
        self.new_function_with_length(name, 0, function)
    }

    /// Like [`Context::new_function`], reporting `length` as the function's
    /// declared parameter count.
    pub fn new_function_with_length<F>(&self, name: &str, length: usize, function: F) -> Result<Value>
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<Value> + 'static,
    {
        let object = callbacks::register(self, name, length, Capability::Function(Rc::new(function)))?;
        tracing::debug!(name, length, "Native function created");
        Ok(self.wrap(object.into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Context, Error, Vm};
    use std::cell::Cell;
    use std::rc::Rc;

    fn context() -> Context {
        let vm = Vm::new().unwrap();
        Context::new(&vm).unwrap()
    }

    #[test]
    fn test_bridged_add() {
        let ctx = context();
        let add = ctx
            .new_function_with_length("add", 2, |ctx, _this, args| {
                let sum: f64 = args.iter().filter_map(|v| v.number_value()).sum();
                Ok(ctx.number(sum))
            })
            .unwrap();
        ctx.global().set("add", &add).unwrap();

        assert_eq!(ctx.eval("add(1, 2)").unwrap().number_value(), Some(3.0));
        assert_eq!(ctx.eval("add.length").unwrap().number_value(), Some(2.0));

        // Callable from the host too
        let direct = add.call(&[ctx.number(4.0), ctx.number(5.0)], None).unwrap();
        assert_eq!(direct.number_value(), Some(9.0));
    }

    #[test]
    fn test_receiver_is_passed_through() {
        let ctx = context();
        let whoami = ctx
            .new_function("whoami", |_ctx, this, _args| this.get("name"))
            .unwrap();
        let object = ctx.eval("({ name: 'widget' })").unwrap();
        object.set("whoami", &whoami).unwrap();
        ctx.global().set("widget", &object).unwrap();

        assert_eq!(ctx.eval("widget.whoami()").unwrap().string_value().as_deref(), Some("widget"));
    }

    #[test]
    fn test_host_error_is_catchable() {
        let ctx = context();
        let fail = ctx
            .new_function("fail", |_ctx, _this, _args| Err(Error::AddToNonArray))
            .unwrap();
        ctx.global().set("fail", &fail).unwrap();

        let message = ctx
            .eval("try { fail(); } catch (e) { (e instanceof TypeError) + ':' + e.message }")
            .unwrap();
        assert_eq!(
            message.string_value().as_deref(),
            Some("true:Cannot add an element to a non-array value")
        );
    }

    #[test]
    fn test_thrown_value_is_rethrown_unchanged() {
        let ctx = context();
        let rethrow = ctx
            .new_function("rethrow", |ctx, _this, args| {
                Err(Error::Evaluation(args.first().cloned().unwrap_or_else(|| ctx.undefined())))
            })
            .unwrap();
        ctx.global().set("rethrow", &rethrow).unwrap();

        let caught = ctx.eval("try { rethrow(42); } catch (e) { e }").unwrap();
        assert_eq!(caught.number_value(), Some(42.0));
    }

    #[test]
    fn test_closure_state_survives_calls() {
        let ctx = context();
        let calls = Rc::new(Cell::new(0));
        let counter = {
            let calls = Rc::clone(&calls);
            ctx.new_function("tick", move |ctx, _this, _args| {
                calls.set(calls.get() + 1);
                Ok(ctx.number(calls.get() as f64))
            })
            .unwrap()
        };
        ctx.global().set("tick", &counter).unwrap();

        assert_eq!(ctx.eval("tick(); tick(); tick()").unwrap().number_value(), Some(3.0));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_callback_after_context_release() {
        let vm = Vm::new().unwrap();
        let ctx = Context::new(&vm).unwrap();
        let noop = ctx.new_function("noop", |ctx, _this, _args| Ok(ctx.undefined())).unwrap();
        drop(ctx);

        assert!(matches!(noop.call(&[], None), Err(Error::ContextReleased)));
    }
}
