//! Awaiting a promise from the host.
//!
//! A promise-shaped value moves through four states:
//!
//! 1. **Evaluated**: the script produced a value
//! 2. **Validated**: the value is a non-callable object that is a promise or
//!    has a `then` property
//! 3. **Chained**: `then` was called with two native callbacks
//! 4. **Settled**: one callback fired and resumed the continuation
//!
//! The callbacks share a [`ResumeGate`]. Only the first one to fire counts.
//! While `then` itself is running, a settlement is parked in the gate and
//! delivered after `then`'s return value has been checked, so a misbehaving
//! `then` is reported as a failure only when nothing has resumed yet.

use crate::error::{Error, Result};
use crate::promise::continuation::{Continuation, Pending};
use crate::runtime::context::Context;
use crate::value::Value;
use boa_engine::JsValue;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

enum Settlement {
    Fulfilled(JsValue),
    Rejected(JsValue),
}

struct ResumeGate {
    continuation: Continuation<Settlement>,
    /// Set while `then` is running
    chaining: Cell<bool>,
    /// Set by the first callback; later ones are ignored
    fired: Cell<bool>,
    parked: RefCell<Option<Settlement>>,
}

impl ResumeGate {
    fn new(continuation: Continuation<Settlement>) -> Self {
        Self {
            continuation,
            chaining: Cell::new(false),
            fired: Cell::new(false),
            parked: RefCell::new(None),
        }
    }

    fn settle(&self, settlement: Settlement) {
        if self.fired.replace(true) {
            tracing::debug!("Promise callback fired after settlement; ignored");
            return;
        }
        if self.chaining.get() {
            *self.parked.borrow_mut() = Some(settlement);
        } else {
            self.continuation.resume(settlement);
        }
    }

    fn begin_chaining(&self) {
        self.chaining.set(true);
    }

    /// Ends the `then` call, returning a settlement that arrived during it.
    fn end_chaining(&self) -> Option<Settlement> {
        self.chaining.set(false);
        self.parked.borrow_mut().take()
    }

    /// Closes the gate so later callbacks are ignored.
    fn close(&self) {
        self.fired.set(true);
    }
}

impl Context {
    /// Waits for a promise-shaped `value` to settle.
    ///
    /// Engine jobs run while waiting. Between rounds the driver parks until
    /// either the promise settles or new jobs are enqueued, so a promise
    /// resolved later by host code (for example through
    /// [`crate::PromiseResolvers`] from another task on the same thread) is
    /// picked up.
    ///
    /// # Errors
    ///
    /// - `Error::AsyncEvalMustReturnPromise` if `value` is callable or not
    ///   promise-shaped
    /// - `Error::InvalidAsyncPromise` if `then` is not callable, or returns a
    ///   non-promise before anything has settled
    /// - `Error::Evaluation` carrying the rejection reason, or the error
    ///   thrown by `then`
    pub async fn await_promise(&self, value: &Value) -> Result<Value> {
        // Evaluated -> Validated
        if value.is_function() || !value.is_thenable() {
            return Err(Error::AsyncEvalMustReturnPromise);
        }

        // Validated -> Chained
        let then = value.get("then")?;
        if !then.is_function() {
            return Err(Error::InvalidAsyncPromise);
        }

        let (continuation, mut pending) = Continuation::channel();
        let gate = Rc::new(ResumeGate::new(continuation));
        let on_fulfilled = self.settle_callback("onFulfilled", &gate, Settlement::Fulfilled)?;
        let on_rejected = self.settle_callback("onRejected", &gate, Settlement::Rejected)?;

        gate.begin_chaining();
        let returned = then.call(&[on_fulfilled, on_rejected], Some(value));
        let parked = gate.end_chaining();

        let violation = match returned {
            Ok(returned) if returned.is_thenable() => None,
            Ok(_) => Some(Error::InvalidAsyncPromise),
            Err(err) => Some(err),
        };
        if let Some(violation) = violation {
            if !gate.fired.get() {
                gate.close();
                return Err(violation);
            }
            tracing::warn!("Promise protocol violation after settlement: {violation}");
            self.report_violation(violation);
        }
        if let Some(settlement) = parked {
            gate.continuation.resume(settlement);
        }

        // Chained -> Settled
        match self.wait_for(&mut pending).await? {
            Settlement::Fulfilled(value) => Ok(self.wrap(value)),
            Settlement::Rejected(reason) => Err(Error::Evaluation(self.wrap(reason))),
        }
    }

    fn settle_callback(
        &self,
        name: &str,
        gate: &Rc<ResumeGate>,
        settlement: fn(JsValue) -> Settlement,
    ) -> Result<Value> {
        let gate = Rc::clone(gate);
        self.new_function_with_length(name, 1, move |ctx, _this, args| {
            let value = args.first().map_or_else(JsValue::undefined, |arg| arg.as_js_value().clone());
            gate.settle(settlement(value));
            Ok(ctx.undefined())
        })
    }

    fn report_violation(&self, violation: Error) {
        let exception = match violation {
            Error::Evaluation(thrown) => Some(thrown),
            other => self.error(&other.to_string()).ok(),
        };
        self.report_exception(exception);
    }

    async fn wait_for(&self, pending: &mut Pending<Settlement>) -> Result<Settlement> {
        let jobs = Rc::clone(&self.inner.vm.inner.jobs);
        loop {
            match self.drive_jobs().await {
                Ok(()) => {}
                Err(Error::ContextBusy) => {
                    // Another driver owns the engine for now
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err),
            }

            if let Some(settled) = pending.try_take() {
                return settled;
            }
            if jobs.has_pending_jobs() {
                continue;
            }

            tokio::select! {
                settled = &mut *pending => return settled,
                () = jobs.enqueued() => {}
            }
        }
    }
}
