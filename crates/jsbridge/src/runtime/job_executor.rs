//! Job executor for Boa's promise job queue
//!
//! The engine hands every job (promise reactions, native async jobs, generic
//! host jobs) to this executor. Jobs are queued per kind and drained either
//! synchronously after an evaluation or asynchronously by the promise driver.
//!
//! # Execution Model
//!
//! 1. All pending async jobs are polled concurrently using `FutureGroup`
//! 2. After each poll, one generic job (macrotask) and every promise job
//!    (microtask) are run
//! 3. The loop ends once every queue is empty
//!
//! Errors escaping a job are logged and buffered; the context that drove the
//! jobs forwards them to its exception handler.

use boa_engine::{
    context::Context,
    job::{GenericJob, Job, JobExecutor, NativeAsyncJob, PromiseJob},
    JsError,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::Notify;

pub struct BridgeJobExecutor {
    /// Queue for promise microtasks (then/catch handlers)
    promise_jobs: RefCell<VecDeque<PromiseJob>>,
    /// Queue for native async jobs
    async_jobs: RefCell<VecDeque<NativeAsyncJob>>,
    /// Queue for general-purpose jobs
    generic_jobs: RefCell<VecDeque<GenericJob>>,
    /// Errors that escaped a job and have not been reported yet
    uncaught: RefCell<Vec<JsError>>,
    /// Signalled on every enqueue so a parked promise driver can resume
    wakeup: Notify,
}

impl BridgeJobExecutor {
    pub fn new() -> Self {
        Self {
            promise_jobs: RefCell::default(),
            async_jobs: RefCell::default(),
            generic_jobs: RefCell::default(),
            uncaught: RefCell::default(),
            wakeup: Notify::new(),
        }
    }

    /// Returns true if there are pending jobs in any queue.
    pub fn has_pending_jobs(&self) -> bool {
        !self.promise_jobs.borrow().is_empty()
            || !self.async_jobs.borrow().is_empty()
            || !self.generic_jobs.borrow().is_empty()
    }

    /// Resolves once a job has been enqueued since the last wake-up.
    ///
    /// An enqueue that happens before this future is polled is not lost.
    pub async fn enqueued(&self) {
        self.wakeup.notified().await;
    }

    /// Takes every error buffered since the last call.
    pub fn take_uncaught(&self) -> Vec<JsError> {
        std::mem::take(&mut *self.uncaught.borrow_mut())
    }

    fn record_uncaught(&self, kind: &str, err: JsError) {
        tracing::error!("Uncaught error in {kind} job: {err}");
        self.uncaught.borrow_mut().push(err);
    }

    /// Runs at most one generic job and then every pending promise job.
    ///
    /// Async jobs are polled separately by `run_jobs_async`.
    fn drain_jobs(&self, context: &mut Context) {
        let generic = self.generic_jobs.borrow_mut().pop_front();
        if let Some(generic) = generic {
            if let Err(err) = generic.call(context) {
                self.record_uncaught("generic", err);
            }
        }

        loop {
            let jobs = std::mem::take(&mut *self.promise_jobs.borrow_mut());
            if jobs.is_empty() {
                break;
            }
            for job in jobs {
                if let Err(err) = job.call(context) {
                    self.record_uncaught("promise", err);
                }
            }
        }

        context.clear_kept_objects();
    }
}

impl Default for BridgeJobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor for BridgeJobExecutor {
    fn enqueue_job(self: Rc<Self>, job: Job, _context: &mut Context) {
        match job {
            Job::PromiseJob(job) => self.promise_jobs.borrow_mut().push_back(job),
            Job::AsyncJob(job) => self.async_jobs.borrow_mut().push_back(job),
            Job::GenericJob(job) => self.generic_jobs.borrow_mut().push_back(job),
            _ => {
                // Timeout jobs need a host timer, which this bridge does not provide
                tracing::warn!("Unsupported job type enqueued, ignoring");
                return;
            }
        }
        self.wakeup.notify_one();
    }

    /// Runs all jobs on the current thread, blocking until the queues are empty.
    fn run_jobs(self: Rc<Self>, context: &mut Context) -> boa_engine::JsResult<()> {
        futures_lite::future::block_on(self.run_jobs_async(&RefCell::new(context)))
    }

    async fn run_jobs_async(self: Rc<Self>, context: &RefCell<&mut Context>) -> boa_engine::JsResult<()>
    where
        Self: Sized,
    {
        use futures_concurrency::future::FutureGroup;
        use futures_lite::{future, StreamExt};

        let mut group = FutureGroup::new();

        loop {
            for job in std::mem::take(&mut *self.async_jobs.borrow_mut()) {
                group.insert(job.call(context));
            }

            if group.is_empty()
                && self.promise_jobs.borrow().is_empty()
                && self.generic_jobs.borrow().is_empty()
            {
                return Ok(());
            }

            if let Some(Err(err)) = future::poll_once(group.next()).await.flatten() {
                self.record_uncaught("async", err);
            }

            self.drain_jobs(&mut context.borrow_mut());
            future::yield_now().await;
        }
    }
}
