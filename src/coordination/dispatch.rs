//! Main-context dispatch
//!
//! All loader state mutation and runtime lifecycle calls happen on one logical
//! execution context. Work arriving from fetch threads is posted here as a job
//! and runs strictly in submission order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A unit of work for the main context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The serialized execution context the loader mutates its state on
pub trait MainContext: Send + Sync {
    /// Queue a job; jobs run one at a time in submission order
    fn post(&self, job: Job);
}

/// Main context backed by a single tokio task draining a job queue
#[derive(Debug, Clone)]
pub struct SerialDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialDispatcher {
    /// Spawn the dispatcher task on the current tokio runtime.
    ///
    /// The task exits once every `SerialDispatcher` clone has been dropped.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            log::debug!("Main context dispatcher stopped");
        });
        (Self { tx }, handle)
    }
}

impl MainContext for SerialDispatcher {
    fn post(&self, job: Job) {
        if self.tx.send(job).is_err() {
            log::warn!("Main context dispatcher is gone; dropping job");
        }
    }
}

/// Main context that runs jobs on the caller's thread, immediately.
///
/// Suitable when the caller is already the only thread touching the loader,
/// and in tests where deterministic interleavings are wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl MainContext for InlineContext {
    fn post(&self, job: Job) {
        job();
    }
}

/// Convenience for posting a closure to a shared context
pub fn run_on_main<F>(ctx: &Arc<dyn MainContext>, f: F)
where
    F: FnOnce() + Send + 'static,
{
    ctx.post(Box::new(f));
}
