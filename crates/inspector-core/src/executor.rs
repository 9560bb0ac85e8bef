//! Serialized execution domains and the executor handles the target uses
//! to cross between them.
//!
//! A domain is a queue of jobs run one at a time against state owned by the
//! domain. The script-execution domain owns the script runtime; the control
//! domain owns nothing but is where agent bookkeeping happens. Crossing
//! domains is always "submit a job and move on".

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::script::ScriptRuntime;

pub type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// A job for the script-execution domain.
pub type ScriptJob = Box<dyn FnOnce(&mut dyn ScriptRuntime) + Send + 'static>;

/// A job for the control domain.
pub type VoidJob = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{domain} domain is closed")]
    DomainClosed { domain: &'static str },
}

pub struct JobSender<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for JobSender<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> JobSender<S> {
    /// Queues a job. Returns false if the receiving side is gone.
    pub fn submit(&self, job: impl FnOnce(&mut S) + Send + 'static) -> bool {
        let job: Job<S> = Box::new(job);
        self.tx.send(job).is_ok()
    }
}

pub struct JobQueue<S> {
    rx: mpsc::UnboundedReceiver<Job<S>>,
}

impl<S: 'static> JobQueue<S> {
    pub async fn recv(&mut self) -> Option<Job<S>> {
        self.rx.recv().await
    }

    /// Runs queued jobs until the queue is empty, including jobs queued by
    /// the jobs themselves. Returns how many ran.
    pub fn run_pending(&mut self, state: &mut S) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(&mut *state);
            ran += 1;
        }
        ran
    }
}

/// Creates an unbounded job queue a host can drive from its own loop.
pub fn job_queue<S: 'static>() -> (JobSender<S>, JobQueue<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (JobSender { tx }, JobQueue { rx })
}

/// Handle to a domain running as its own task.
pub struct DomainHandle<S> {
    name: &'static str,
    sender: JobSender<S>,
}

impl<S> Clone for DomainHandle<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<S: 'static> DomainHandle<S> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sender(&self) -> JobSender<S> {
        self.sender.clone()
    }

    /// Runs `f` on the domain and waits for its result.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ExecutorError>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let submitted = self.sender.submit(move |state| {
            let _ = reply_tx.send(f(state));
        });
        if !submitted {
            return Err(ExecutorError::DomainClosed { domain: self.name });
        }
        reply_rx
            .await
            .map_err(|_| ExecutorError::DomainClosed { domain: self.name })
    }

    /// Resolves once every job queued before this call has run.
    pub async fn flush(&self) -> Result<(), ExecutorError> {
        self.run(|_| ()).await
    }
}

impl DomainHandle<Box<dyn ScriptRuntime>> {
    pub fn runtime_executor(&self) -> RuntimeExecutor {
        RuntimeExecutor::from(self.sender())
    }
}

impl DomainHandle<()> {
    pub fn void_executor(&self) -> VoidExecutor {
        VoidExecutor::from(self.sender())
    }
}

/// Spawns a domain task that owns `state` and runs jobs against it in
/// submission order. The task ends once every sender is dropped.
pub fn spawn_domain<S: Send + 'static>(name: &'static str, mut state: S) -> DomainHandle<S> {
    let (sender, mut queue) = job_queue::<S>();

    tokio::spawn(async move {
        debug!(domain = name, "Execution domain started");
        while let Some(job) = queue.recv().await {
            job(&mut state);
        }
        debug!(domain = name, "Execution domain stopped");
    });

    DomainHandle { name, sender }
}

pub fn spawn_script_domain(
    runtime: impl ScriptRuntime + 'static,
) -> DomainHandle<Box<dyn ScriptRuntime>> {
    spawn_domain("script", Box::new(runtime) as Box<dyn ScriptRuntime>)
}

pub fn spawn_control_domain() -> DomainHandle<()> {
    spawn_domain("control", ())
}

/// Submits work to the script-execution domain.
#[derive(Clone)]
pub struct RuntimeExecutor {
    submit: Arc<dyn Fn(ScriptJob) + Send + Sync>,
}

impl RuntimeExecutor {
    pub fn new(submit: impl Fn(ScriptJob) + Send + Sync + 'static) -> Self {
        Self {
            submit: Arc::new(submit),
        }
    }

    pub fn execute(&self, job: impl FnOnce(&mut dyn ScriptRuntime) + Send + 'static) {
        (self.submit)(Box::new(job));
    }
}

impl From<JobSender<Box<dyn ScriptRuntime>>> for RuntimeExecutor {
    fn from(sender: JobSender<Box<dyn ScriptRuntime>>) -> Self {
        Self::new(move |job| {
            let submitted = sender.submit(move |runtime: &mut Box<dyn ScriptRuntime>| {
                job(runtime.as_mut());
            });
            if !submitted {
                debug!(domain = "script", "Dropping job for closed domain");
            }
        })
    }
}

/// Submits work to the control domain.
#[derive(Clone)]
pub struct VoidExecutor {
    submit: Arc<dyn Fn(VoidJob) + Send + Sync>,
}

impl VoidExecutor {
    pub fn new(submit: impl Fn(VoidJob) + Send + Sync + 'static) -> Self {
        Self {
            submit: Arc::new(submit),
        }
    }

    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        (self.submit)(Box::new(job));
    }
}

impl From<JobSender<()>> for VoidExecutor {
    fn from(sender: JobSender<()>) -> Self {
        Self::new(move |job| {
            if !sender.submit(move |_: &mut ()| job()) {
                debug!(domain = "control", "Dropping job for closed domain");
            }
        })
    }
}
