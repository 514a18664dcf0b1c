use crate::error::{Error, Result};
use crate::limits::ResourceLimits;
use crate::runtime::engine::EngineCell;
use crate::runtime::job_executor::BridgeJobExecutor;
use std::fmt;
use std::rc::Rc;

/// An isolated engine instance shared by one or more [`Context`](crate::Context)s.
///
/// The VM owns the Boa engine (and with it the garbage-collected heap every
/// derived context allocates from) plus the job executor that runs promise
/// reactions. It is reference counted: each context holds a strong reference,
/// so the engine is released only when the last context and the last `Vm`
/// handle are dropped.
///
/// The engine is single-threaded, so a `Vm` and everything derived from it
/// stay on the thread that created them.
#[derive(Clone)]
pub struct Vm {
    pub(crate) inner: Rc<VmInner>,
}

pub(crate) struct VmInner {
    pub(crate) engine: EngineCell,
    pub(crate) jobs: Rc<BridgeJobExecutor>,
}

impl Vm {
    /// Creates a VM with the engine's default limits.
    pub fn new() -> Result<Self> {
        Self::with_limits(ResourceLimits::default())
    }

    /// Creates a VM whose engine enforces `limits`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLimits` if `limits` fails validation, or
    /// `Error::EvaluationString` if the engine cannot be initialised.
    pub fn with_limits(limits: ResourceLimits) -> Result<Self> {
        limits.validate().map_err(Error::InvalidLimits)?;

        let jobs = Rc::new(BridgeJobExecutor::new());
        let mut engine = boa_engine::Context::builder()
            .job_executor(jobs.clone())
            .build()
            .map_err(|e| Error::EvaluationString(format!("Failed to initialise engine: {e}")))?;
        limits.apply(&mut engine);

        tracing::debug!(?limits, "VM created");

        Ok(Self {
            inner: Rc::new(VmInner {
                engine: EngineCell::new(engine),
                jobs,
            }),
        })
    }

    /// Number of live owners: `Vm` handles plus contexts created from it.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Asks the collector to run now. Best effort: values still reachable
    /// from a root (a global property, a live [`Value`](crate::Value), a
    /// retained closure) survive.
    pub fn collect_garbage(&self) {
        tracing::trace!("Forcing garbage collection");
        boa_gc::force_collect();
    }

    /// Returns true if promise or host jobs are waiting to run.
    pub fn has_pending_jobs(&self) -> bool {
        self.inner.jobs.has_pending_jobs()
    }

    pub(crate) fn ptr_eq(&self, other: &Vm) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("ref_count", &self.ref_count())
            .field("pending_jobs", &self.has_pending_jobs())
            .finish()
    }
}

impl Drop for VmInner {
    fn drop(&mut self) {
        tracing::debug!("Releasing VM");
    }
}
