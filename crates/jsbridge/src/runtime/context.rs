use crate::bridge::callbacks::CapabilityTable;
use crate::error::{runtime_limit_message, Error, Result};
use crate::runtime::vm::Vm;
use crate::value::Value;
use boa_engine::{
    job::JobExecutor,
    object::{builtins::JsArray, JsObject},
    realm::Realm,
    Context as Engine, JsNativeError, JsResult, JsString, JsValue, Script, Source,
};
use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

/// Evaluates its argument with a direct `eval`, so the caller-supplied
/// receiver becomes `this` for the evaluated source.
const EVAL_WITH_THIS: &str = "(function (source) { return eval(source); })";

pub(crate) type ExceptionHandler = dyn Fn(Option<&Context>, Option<&Value>);

/// One global execution environment inside a [`Vm`].
///
/// A context evaluates scripts, owns a global object, and owns the
/// capability table holding every native closure bound into it. Cloning a
/// context (or calling [`Context::alias`]) shares the same global
/// environment; the environment is released when the last alias is dropped.
///
/// [`Value`]s keep only a weak back-reference to their context. Operations on
/// a value whose context is gone fail with [`Error::ContextReleased`].
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Rc<ContextInner>,
}

// Fields drop in order; `vm` goes last so the engine outlives everything
// rooted here.
pub(crate) struct ContextInner {
    realm: Realm,
    global: JsObject,
    pub(crate) capabilities: RefCell<CapabilityTable>,
    exception_handler: RefCell<Option<Rc<ExceptionHandler>>>,
    pub(crate) vm: Vm,
}

impl Context {
    /// Creates a context with a fresh global object in `vm`.
    pub fn new(vm: &Vm) -> Result<Self> {
        let (realm, global) = vm
            .inner
            .engine
            .with(|engine| -> JsResult<(Realm, JsObject)> {
                let realm = engine.create_realm()?;
                let previous = engine.enter_realm(realm.clone());
                let global = engine.global_object();
                engine.enter_realm(previous);
                Ok((realm, global))
            })?
            .map_err(|e| Error::EvaluationString(format!("Failed to create realm: {e}")))?;

        tracing::debug!(vm_owners = vm.ref_count() + 1, "Context created");

        Ok(Self {
            inner: Rc::new(ContextInner {
                realm,
                global,
                capabilities: RefCell::default(),
                exception_handler: RefCell::default(),
                vm: vm.clone(),
            }),
        })
    }

    /// Returns another owner of the same global environment.
    pub fn alias(existing: &Context) -> Self {
        existing.clone()
    }

    /// Number of live aliases of this context.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// The VM this context was created in.
    pub fn vm(&self) -> &Vm {
        &self.inner.vm
    }

    /// Returns true if both handles refer to the same global environment.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true if both contexts were created in the same VM.
    pub fn shares_vm_with(&self, other: &Context) -> bool {
        self.inner.vm.ptr_eq(&other.inner.vm)
    }

    pub(crate) fn from_inner(inner: Rc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn wrap(&self, raw: JsValue) -> Value {
        Value::from_raw(raw, self.downgrade())
    }

    /// Runs `f` on the engine with this context's realm entered.
    pub(crate) fn enter<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> Result<R> {
        self.inner.vm.inner.engine.with(|engine| {
            let previous = engine.enter_realm(self.inner.realm.clone());
            let outcome = f(engine);
            engine.enter_realm(previous);
            outcome
        })
    }

    /// Like [`Context::enter`], converting a thrown error into
    /// `Error::Evaluation` carrying the thrown value.
    ///
    /// An exhausted loop, recursion or stack limit has no thrown value and
    /// becomes `Error::RuntimeLimit` instead.
    pub(crate) fn try_enter<R>(&self, f: impl FnOnce(&mut Engine) -> JsResult<R>) -> Result<R> {
        self.enter(|engine| {
            f(engine).map_err(|err| match runtime_limit_message(&err) {
                Some(message) => Err(message),
                None => Ok(err.to_opaque(engine)),
            })
        })?
        .map_err(|failure| match failure {
            Ok(thrown) => Error::Evaluation(self.wrap(thrown)),
            Err(message) => {
                tracing::warn!("Evaluation aborted: {message}");
                Error::RuntimeLimit(message)
            }
        })
    }

    pub(crate) fn engine_is_reentered(&self) -> bool {
        self.inner.vm.inner.engine.is_reentered()
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluates `source` and returns its completion value.
    ///
    /// Pending promise jobs are drained before returning, unless this call is
    /// nested inside a native callback.
    ///
    /// # Errors
    ///
    /// - `Error::Evaluation` carrying the thrown value if the script throws or
    ///   fails to parse
    /// - `Error::RuntimeLimit` if a loop, recursion or stack limit is hit
    pub fn eval(&self, source: &str) -> Result<Value> {
        tracing::debug!(bytes = source.len(), "eval");
        let result = self.try_enter(|engine| engine.eval(Source::from_bytes(source)));
        self.settle_jobs();
        result.map(|raw| self.wrap(raw))
    }

    /// Evaluates `source` with `this` bound to `this_value`.
    ///
    /// The source runs through a direct `eval` inside a function, so `var`
    /// declarations stay local to that evaluation.
    ///
    /// # Errors
    ///
    /// Same as [`Context::eval`].
    pub fn eval_with_this(&self, source: &str, this_value: &Value) -> Result<Value> {
        tracing::debug!(bytes = source.len(), "eval with receiver");
        let result = self.try_enter(|engine| {
            let trampoline = engine.eval(Source::from_bytes(EVAL_WITH_THIS))?;
            let function = trampoline
                .as_object()
                .ok_or_else(|| JsNativeError::typ().with_message("eval trampoline is not a function"))?;
            function.call(
                this_value.as_js_value(),
                &[JsValue::new(JsString::from(source))],
                engine,
            )
        });
        self.settle_jobs();
        result.map(|raw| self.wrap(raw))
    }

    /// Reads the script at `path` and evaluates it.
    ///
    /// # Errors
    ///
    /// - `Error::MissingResource` if `path` does not exist
    /// - `Error::ScriptLoad` if the file cannot be read
    /// - `Error::Evaluation` if the script throws
    /// - `Error::RuntimeLimit` if a loop, recursion or stack limit is hit
    pub fn load_script(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingResource(format!(
                "Script path does not exist: {}",
                path.display()
            )));
        }

        let source = std::fs::read_to_string(path).map_err(|e| Error::ScriptLoad {
            url: path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), "Script source loaded");

        let result =
            self.try_enter(|engine| engine.eval(Source::from_bytes(&source).with_path(path)));
        self.settle_jobs();
        result.map(|raw| self.wrap(raw))
    }

    /// Returns true if `source` parses as a script. Nothing is executed.
    ///
    /// # Returns
    ///
    /// `false` for a syntax error, and also when the source could not be
    /// checked because the engine is busy driving jobs for an async
    /// evaluation. Use [`Context::try_check`] to tell the two apart.
    pub fn check(&self, source: &str) -> bool {
        self.check_with_origin(source, None, 1)
    }

    /// Like [`Context::check`], attributing failures to `source_url` starting
    /// at `starting_line` in the log output.
    ///
    /// # Returns
    ///
    /// `false` for a syntax error or an unchecked source, as for
    /// [`Context::check`].
    pub fn check_with_origin(&self, source: &str, source_url: Option<&str>, starting_line: u32) -> bool {
        match self.try_check_with_origin(source, source_url, starting_line) {
            Ok(parses) => parses,
            Err(err) => {
                tracing::warn!("Syntax check skipped: {err}");
                false
            }
        }
    }

    /// Like [`Context::check`], reporting a source that could not be checked.
    ///
    /// # Errors
    ///
    /// `Error::ContextBusy` if the engine is driving jobs for another caller.
    pub fn try_check(&self, source: &str) -> Result<bool> {
        self.try_check_with_origin(source, None, 1)
    }

    /// Like [`Context::check_with_origin`], reporting a source that could not
    /// be checked.
    ///
    /// # Errors
    ///
    /// `Error::ContextBusy` if the engine is driving jobs for another caller.
    pub fn try_check_with_origin(
        &self,
        source: &str,
        source_url: Option<&str>,
        starting_line: u32,
    ) -> Result<bool> {
        let parsed = self.enter(|engine| {
            let text = Source::from_bytes(source);
            match source_url {
                Some(url) => Script::parse(text.with_path(Path::new(url)), None, engine).map(drop),
                None => Script::parse(text, None, engine).map(drop),
            }
        })?;

        if let Err(err) = parsed {
            tracing::debug!(
                source_url = source_url.unwrap_or("<anonymous>"),
                starting_line,
                "Syntax check failed: {err}"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Runs a full collection on the VM's heap.
    ///
    /// Native closures whose function objects are unreachable are released
    /// from the capability table during the collection.
    pub fn collect_garbage(&self) {
        self.inner.vm.collect_garbage();
    }

    /// The global object of this context.
    pub fn global(&self) -> Value {
        self.wrap(self.inner.global.clone().into())
    }

    // ========================================================================
    // Jobs and the exception channel
    // ========================================================================

    /// Runs every pending promise and host job.
    ///
    /// # Errors
    ///
    /// - `Error::ContextBusy` if the engine is driving jobs for another caller
    /// - `Error::Evaluation` or `Error::RuntimeLimit` if the job loop itself fails
    pub fn run_jobs(&self) -> Result<()> {
        self.try_enter(|engine| engine.run_jobs())?;
        self.dispatch_uncaught();
        Ok(())
    }

    /// Returns true if promise or host jobs are waiting to run in this VM.
    pub fn has_pending_jobs(&self) -> bool {
        self.inner.vm.has_pending_jobs()
    }

    /// Drives pending jobs to completion, yielding between rounds.
    ///
    /// The engine stays borrowed while jobs run; other callers see
    /// `Error::ContextBusy` until this returns.
    pub(crate) async fn drive_jobs(&self) -> Result<()> {
        let jobs = Rc::clone(&self.inner.vm.inner.jobs);
        {
            let mut engine = self.inner.vm.inner.engine.borrow_for_jobs()?;
            let engine = RefCell::new(&mut *engine);
            if let Err(err) = jobs.run_jobs_async(&engine).await {
                tracing::error!("Job driver failed: {err}");
            }
        }
        self.dispatch_uncaught();
        Ok(())
    }

    /// Drains jobs after a synchronous entry point, unless nested in a callback.
    fn settle_jobs(&self) {
        if self.engine_is_reentered() {
            return;
        }
        match self.enter(|engine| engine.run_jobs()) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("Failed to drain jobs: {err}"),
            Err(err) => tracing::debug!("Job drain skipped: {err}"),
        }
        self.dispatch_uncaught();
    }

    fn dispatch_uncaught(&self) {
        for err in self.inner.vm.inner.jobs.take_uncaught() {
            if let Some(message) = runtime_limit_message(&err) {
                tracing::warn!("Job aborted: {message}");
                self.report_exception(Some(self.string(&message)));
                continue;
            }
            match self.enter(|engine| err.to_opaque(engine)) {
                Ok(thrown) => self.report_exception(Some(self.wrap(thrown))),
                Err(e) => tracing::error!("Dropped uncaught error {err}: {e}"),
            }
        }
    }

    /// Installs the handler for errors raised outside any evaluation the host
    /// is waiting on: uncaught job errors and late async protocol violations.
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(Option<&Context>, Option<&Value>) + 'static,
    {
        *self.inner.exception_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Removes the handler; later exceptions are logged instead.
    pub fn clear_exception_handler(&self) {
        self.inner.exception_handler.borrow_mut().take();
    }

    pub(crate) fn report_exception(&self, exception: Option<Value>) {
        let handler = self.inner.exception_handler.borrow().clone();
        match handler {
            Some(handler) => handler(Some(self), exception.as_ref()),
            None => tracing::error!(
                exception = %exception.as_ref().map(ToString::to_string).unwrap_or_default(),
                "Unhandled JavaScript exception"
            ),
        }
    }

    // ========================================================================
    // Construction helpers
    // ========================================================================

    /// The `undefined` value.
    pub fn undefined(&self) -> Value {
        self.wrap(JsValue::undefined())
    }

    /// The `null` value.
    pub fn null(&self) -> Value {
        self.wrap(JsValue::null())
    }

    /// A boolean primitive.
    pub fn boolean(&self, value: bool) -> Value {
        self.wrap(JsValue::new(value))
    }

    /// A number primitive. `NaN` and the infinities are kept as-is.
    pub fn number(&self, value: f64) -> Value {
        self.wrap(JsValue::new(value))
    }

    /// A string primitive holding a copy of `value`.
    pub fn string(&self, value: &str) -> Value {
        self.wrap(JsValue::new(JsString::from(value)))
    }

    /// A new empty object inheriting from `Object.prototype`.
    pub fn object(&self) -> Result<Value> {
        let object = self.enter(|engine| JsObject::with_object_proto(engine.intrinsics()))?;
        Ok(self.wrap(object.into()))
    }

    /// A new array holding `values` in order.
    ///
    /// # Errors
    ///
    /// `Error::ContextBusy` if the engine is driving jobs for another caller.
    pub fn array(&self, values: &[Value]) -> Result<Value> {
        let array = self.enter(|engine| {
            JsArray::from_iter(values.iter().map(|value| value.as_js_value().clone()), engine)
        })?;
        Ok(self.wrap(array.into()))
    }

    /// A `Date` for `time`, truncated to millisecond precision.
    pub fn date(&self, time: SystemTime) -> Result<Value> {
        let millis = match time.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_millis() as f64,
            Err(before) => -(before.duration().as_millis() as f64),
        };
        let date = self.try_enter(|engine| {
            let constructor = engine.intrinsics().constructors().date().constructor();
            constructor.construct(&[JsValue::new(millis)], None, engine)
        })?;
        Ok(self.wrap(date.into()))
    }

    /// A new `Error` object with `message`.
    pub fn error(&self, message: &str) -> Result<Value> {
        let error = self.enter(|engine| {
            JsNativeError::error()
                .with_message(message.to_string())
                .to_opaque(engine)
        })?;
        Ok(self.wrap(error.into()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("ref_count", &self.ref_count())
            .field("capabilities", &self.inner.capabilities.borrow().len())
            .finish()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        tracing::debug!(
            capabilities = self.capabilities.get_mut().len(),
            "Releasing context"
        );
    }
}
