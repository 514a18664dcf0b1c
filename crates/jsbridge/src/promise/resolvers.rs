use crate::error::Result;
use crate::runtime::context::Context;
use crate::value::Value;
use boa_engine::object::builtins::JsPromise;

/// A pending promise together with its resolving functions.
///
/// Settling only enqueues the reaction jobs. They run on the next
/// [`Context::run_jobs`], evaluation, or inside an awaiting driver.
#[derive(Debug, Clone)]
pub struct PromiseResolvers {
    promise: Value,
    resolve: Value,
    reject: Value,
}

impl PromiseResolvers {
    /// The promise itself, to hand to script.
    pub fn promise(&self) -> &Value {
        &self.promise
    }

    /// Resolves the promise with `value`.
    ///
    /// A thenable `value` is adopted. Settling an already settled promise is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// - `Error::ContextReleased` if the owning context is gone
    /// - `Error::ContextBusy` if the engine is driving jobs for another caller
    pub fn resolve(&self, value: &Value) -> Result<()> {
        self.resolve.call(std::slice::from_ref(value), None).map(drop)
    }

    /// Rejects the promise with `reason`.
    ///
    /// Rejecting an already settled promise is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`PromiseResolvers::resolve`].
    pub fn reject(&self, reason: &Value) -> Result<()> {
        self.reject.call(std::slice::from_ref(reason), None).map(drop)
    }
}

impl Context {
    /// Creates a promise that host code settles later.
    ///
    /// # Errors
    ///
    /// `Error::ContextBusy` if the engine is driving jobs for another caller.
    pub fn new_promise(&self) -> Result<PromiseResolvers> {
        let (promise, functions) = self.enter(JsPromise::new_pending)?;
        Ok(PromiseResolvers {
            promise: self.wrap(promise.into()),
            resolve: self.wrap(functions.resolve.into()),
            reject: self.wrap(functions.reject.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Context, Error, Vm};

    #[test]
    fn test_resolvers_settle_once() {
        let vm = Vm::new().unwrap();
        let ctx = Context::new(&vm).unwrap();
        let resolvers = ctx.new_promise().unwrap();
        ctx.global().set("p", resolvers.promise()).unwrap();
        ctx.eval("var seen = []; p.then(v => seen.push(v), e => seen.push('rejected'))").unwrap();

        resolvers.resolve(&ctx.string("first")).unwrap();
        resolvers.reject(&ctx.string("ignored")).unwrap();
        ctx.run_jobs().unwrap();

        assert_eq!(ctx.eval("seen.join(',')").unwrap().string_value().as_deref(), Some("first"));
    }

    #[test]
    fn test_resolve_adopts_thenable() {
        let vm = Vm::new().unwrap();
        let ctx = Context::new(&vm).unwrap();
        let resolvers = ctx.new_promise().unwrap();
        ctx.global().set("p", resolvers.promise()).unwrap();
        ctx.eval("var adopted; p.then(v => { adopted = v; })").unwrap();

        let inner = ctx.eval("Promise.resolve('inner')").unwrap();
        resolvers.resolve(&inner).unwrap();
        ctx.run_jobs().unwrap();

        assert_eq!(ctx.eval("adopted").unwrap().string_value().as_deref(), Some("inner"));
    }

    #[test]
    fn test_settling_after_context_release_fails() {
        let vm = Vm::new().unwrap();
        let resolvers = {
            let ctx = Context::new(&vm).unwrap();
            ctx.new_promise().unwrap()
        };

        assert!(matches!(resolvers.resolve(resolvers.promise()), Err(Error::ContextReleased)));
        assert!(matches!(resolvers.reject(resolvers.promise()), Err(Error::ContextReleased)));
    }

    #[tokio::test]
    async fn test_rejected_promise_is_awaited_as_error() {
        let vm = Vm::new().unwrap();
        let ctx = Context::new(&vm).unwrap();
        let resolvers = ctx.new_promise().unwrap();
        resolvers.reject(&ctx.number(13.0)).unwrap();

        match ctx.await_promise(resolvers.promise()).await {
            Err(Error::Evaluation(reason)) => assert_eq!(reason.number_value(), Some(13.0)),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
