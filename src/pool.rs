//! Bounded worker pool for CPU-heavy transforms.
//!
//! Workers are plain threads reading from a shared task channel. The pool is
//! only engaged for files above the engage threshold; smaller files are
//! transformed inline because dispatch overhead would exceed the work itself.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, warn};
use std::borrow::Cow;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::rules::{RuleSet, validate_syntax};
use crate::types::FileCategory;
use crate::utils::config::PoolConsts;

/// A discrete unit of pooled work. Coarse-grained (whole-file) to amortize
/// dispatch overhead. Consumed exactly once.
#[derive(Debug)]
pub enum Task {
    /// Apply the rule set to pre-loaded content.
    ApplyRules {
        path: PathBuf,
        content: Arc<str>,
        rules: Arc<RuleSet>,
    },
    /// Read the file and apply the rule set.
    ProcessFile { path: PathBuf, rules: Arc<RuleSet> },
    /// Check content for category-appropriate well-formedness.
    ValidateSyntax {
        path: PathBuf,
        category: FileCategory,
        content: Arc<str>,
    },
}

impl Task {
    fn kind(&self) -> &'static str {
        match self {
            Task::ApplyRules { .. } => "apply-rules",
            Task::ProcessFile { .. } => "process-file",
            Task::ValidateSyntax { .. } => "validate-syntax",
        }
    }
}

/// Successful task output.
#[derive(Debug)]
pub enum TaskOutput {
    /// `None` when no rule matched (content unchanged).
    Transformed(Option<String>),
    SyntaxOk,
    SyntaxWarning(String),
}

/// Why a pooled task did not produce output.
#[derive(Debug)]
pub enum TaskFailure {
    /// The hard per-task timeout elapsed. The worker survives; its late
    /// result is discarded.
    Timeout { waited: Duration },
    /// The task panicked a worker and the retry budget is exhausted.
    WorkerFault { message: String },
    /// Task-level error (e.g. the file could not be read).
    Failed { message: String },
    /// The pool was terminated before the task ran.
    PoolTerminated,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Timeout { waited } => {
                write!(f, "task timed out after {:.1}s", waited.as_secs_f64())
            }
            TaskFailure::WorkerFault { message } => write!(f, "worker fault: {message}"),
            TaskFailure::Failed { message } => write!(f, "{message}"),
            TaskFailure::PoolTerminated => write!(f, "worker pool terminated before task ran"),
        }
    }
}

impl std::error::Error for TaskFailure {}

type TaskResult = Result<TaskOutput, TaskFailure>;

struct Envelope {
    task: Task,
    result_tx: Sender<TaskResult>,
    attempt: u8,
}

enum PoolMsg {
    Run(Envelope),
    Shutdown,
}

/// Handle to one submitted task. `wait` blocks until the result arrives or the
/// timeout elapses.
pub struct PendingTask {
    rx: Receiver<TaskResult>,
}

impl PendingTask {
    pub fn wait(self, timeout: Duration) -> TaskResult {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TaskFailure::Timeout { waited: timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(TaskFailure::PoolTerminated),
        }
    }
}

/// Pool diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct PoolStats {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub max_workers: usize,
}

/// Bounded pool sized at `min(configured_max, cpu_count, 8)`.
///
/// Workers are spawned lazily: a submission with no idle worker grows the pool
/// up to its cap; beyond that, tasks queue on the bounded channel and resolve
/// once a worker frees up. A worker that panics requeues its task once and
/// exits; the next submission prunes the dead handle and respawns.
pub struct WorkerPool {
    msg_tx: Sender<PoolMsg>,
    msg_rx: Receiver<PoolMsg>,
    max_workers: usize,
    idle: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    terminated: AtomicBool,
}

impl WorkerPool {
    pub fn new(configured_max: usize) -> Self {
        let max_workers = configured_max
            .max(1)
            .min(rayon::current_num_threads().max(1))
            .min(PoolConsts::HARD_CAP);
        let (msg_tx, msg_rx) = bounded::<PoolMsg>(PoolConsts::QUEUE_CAP);
        debug!("worker pool capped at {max_workers} workers");
        Self {
            msg_tx,
            msg_rx,
            max_workers,
            idle: Arc::new(AtomicUsize::new(0)),
            workers: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Submit a task. Assigns an idle worker immediately, lazily grows the
    /// pool when below cap, or queues until a worker frees up.
    pub fn submit(&self, task: Task) -> PendingTask {
        let (result_tx, result_rx) = bounded::<TaskResult>(1);
        if self.terminated.load(Ordering::SeqCst) {
            // result_tx dropped here; wait() observes PoolTerminated.
            return PendingTask { rx: result_rx };
        }
        self.reap_and_grow();
        let envelope = Envelope {
            task,
            result_tx,
            attempt: 0,
        };
        if self.msg_tx.send(PoolMsg::Run(envelope)).is_err() {
            debug!("task channel closed; pool shutting down");
        }
        PendingTask { rx: result_rx }
    }

    /// Drop finished worker handles and spawn a replacement when no worker is
    /// idle and the pool is below its cap.
    fn reap_and_grow(&self) {
        let mut workers = self.workers.lock().unwrap();
        workers.retain(|h| !h.is_finished());
        let live = workers.len();
        if live < self.max_workers && (self.idle.load(Ordering::Relaxed) == 0 || live == 0) {
            workers.push(self.spawn_worker());
        }
    }

    fn spawn_worker(&self) -> JoinHandle<()> {
        let msg_rx = self.msg_rx.clone();
        let requeue_tx = self.msg_tx.clone();
        let idle = Arc::clone(&self.idle);
        std::thread::spawn(move || worker_loop(msg_rx, requeue_tx, idle))
    }

    pub fn stats(&self) -> PoolStats {
        let mut workers = self.workers.lock().unwrap();
        workers.retain(|h| !h.is_finished());
        PoolStats {
            total_workers: workers.len(),
            idle_workers: self.idle.load(Ordering::Relaxed),
            queued_tasks: self.msg_rx.len(),
            max_workers: self.max_workers,
        }
    }

    /// Drain the queue and stop every worker. Queued tasks resolve as
    /// [`TaskFailure::PoolTerminated`]. Idempotent.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        // Clear pending work first so workers only see shutdown messages.
        while let Ok(msg) = self.msg_rx.try_recv() {
            drop(msg);
        }
        let mut workers = self.workers.lock().unwrap();
        for _ in workers.iter() {
            let _ = self.msg_tx.send(PoolMsg::Shutdown);
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop(msg_rx: Receiver<PoolMsg>, requeue_tx: Sender<PoolMsg>, idle: Arc<AtomicUsize>) {
    loop {
        idle.fetch_add(1, Ordering::Relaxed);
        let msg = msg_rx.recv();
        idle.fetch_sub(1, Ordering::Relaxed);
        let envelope = match msg {
            Ok(PoolMsg::Run(envelope)) => envelope,
            Ok(PoolMsg::Shutdown) | Err(_) => break,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| run_task(&envelope.task)));
        match outcome {
            Ok(result) => {
                // Send fails when the waiter already timed out; discard.
                let _ = envelope.result_tx.send(result);
            }
            Err(panic) => {
                let message = panic_message(&panic);
                warn!(
                    "worker fault in {} task: {message}; replacing worker",
                    envelope.task.kind()
                );
                if envelope.attempt < PoolConsts::MAX_REQUEUES {
                    let _ = requeue_tx.send(PoolMsg::Run(Envelope {
                        attempt: envelope.attempt + 1,
                        ..envelope
                    }));
                } else {
                    let _ = envelope
                        .result_tx
                        .send(Err(TaskFailure::WorkerFault { message }));
                }
                // This worker's state is suspect after a panic; exit and let
                // the next submission respawn a replacement.
                break;
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_task(task: &Task) -> TaskResult {
    match task {
        Task::ApplyRules { content, rules, .. } => Ok(apply_output(rules, content)),
        Task::ProcessFile { path, rules } => {
            let content = std::fs::read_to_string(path).map_err(|e| TaskFailure::Failed {
                message: format!("read {}: {e}", path.display()),
            })?;
            Ok(apply_output(rules, &content))
        }
        Task::ValidateSyntax {
            category, content, ..
        } => Ok(match validate_syntax(*category, content) {
            None => TaskOutput::SyntaxOk,
            Some(message) => TaskOutput::SyntaxWarning(message),
        }),
    }
}

fn apply_output(rules: &RuleSet, content: &str) -> TaskOutput {
    match rules.apply(content) {
        Cow::Borrowed(_) => TaskOutput::Transformed(None),
        Cow::Owned(s) => TaskOutput::Transformed(Some(s)),
    }
}
