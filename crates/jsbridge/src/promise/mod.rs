//! Promise-driven async evaluation.
//!
//! [`Context::async_eval`] evaluates a script that produces a promise and
//! waits for it on a [`Continuation`]. The continuation resumes exactly once,
//! with the fulfilled value or the rejection reason. There is no timeout and
//! no cancellation: a promise that never settles keeps the caller waiting.

mod adapter;
mod continuation;
mod resolvers;

pub use continuation::{Continuation, Pending};
pub use resolvers::PromiseResolvers;

use crate::error::{Error, Result};
use crate::runtime::context::Context;
use crate::value::Value;

/// How [`Context::async_eval_with`] turns a script into a promise.
#[derive(Debug, Clone, Default)]
pub struct AsyncEvalOptions {
    /// Receiver (`this`) for the evaluated script.
    pub this: Option<Value>,
    /// A method of the evaluated value to call with no arguments; its result
    /// is awaited instead of the value itself.
    pub method: Option<String>,
}

impl AsyncEvalOptions {
    /// Evaluates the script with `this` bound to `this`.
    pub fn with_this(mut self, this: Value) -> Self {
        self.this = Some(this);
        self
    }

    /// Awaits the result of calling `method` on the evaluated value, with the
    /// evaluated value as its receiver.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

impl Context {
    /// Evaluates `source` and waits for the promise it returns.
    ///
    /// ```no_run
    /// # use jsbridge::{Context, Vm};
    /// # async fn run() -> jsbridge::Result<()> {
    /// let vm = Vm::new()?;
    /// let ctx = Context::new(&vm)?;
    /// let value = ctx.async_eval("Promise.resolve('X')").await?;
    /// assert_eq!(value.string_value().as_deref(), Some("X"));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Everything [`Context::eval`] and [`Context::await_promise`] return.
    pub async fn async_eval(&self, source: &str) -> Result<Value> {
        self.async_eval_with(source, AsyncEvalOptions::default()).await
    }

    pub async fn async_eval_with(&self, source: &str, options: AsyncEvalOptions) -> Result<Value> {
        let AsyncEvalOptions { this, method } = options;
        tracing::debug!(bytes = source.len(), method = method.as_deref(), "async eval");

        let evaluated = match &this {
            Some(this) => self.eval_with_this(source, this)?,
            None => self.eval(source)?,
        };

        let promise = match method {
            Some(method) => {
                let member = evaluated.get(&method)?;
                if !member.is_function() {
                    return Err(Error::CallOnNonFunction);
                }
                member.call(&[], Some(&evaluated))?
            }
            None => evaluated,
        };

        self.await_promise(&promise).await
    }
}
