//! Per-frame worker pool for ad hoc task submission

use crate::hook::panic_message;
use crate::runtime::{FrameError, TaskError};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use stagehand_types::TaskId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Shared run state of one submitted task
#[derive(Debug)]
pub(crate) struct TaskControl {
    id: TaskId,
    state: AtomicU8,
}

impl TaskControl {
    fn new(id: TaskId) -> Self {
        Self {
            id,
            state: AtomicU8::new(PENDING),
        }
    }

    /// Cancel the task if no worker has picked it up yet
    pub(crate) fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn begin(&self) -> bool {
        self.state
            .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.state.load(Ordering::SeqCst), DONE | CANCELLED)
    }
}

/// Handle to a task submitted with [`WorkerPool::submit`]
///
/// Dropping the handle does not cancel the task.
pub struct TaskHandle<T> {
    control: Arc<TaskControl>,
    result: Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.control.id
    }

    /// Cancel the task if it has not started; returns whether it was cancelled
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Wait up to `timeout` for the task's result
    ///
    /// The result can be taken once; later calls report
    /// [`TaskError::Failed`].
    pub fn wait(&self, timeout: Duration) -> Result<T, TaskError> {
        if self.control.is_cancelled() {
            return Err(TaskError::Cancelled(self.control.id));
        }
        match self.result.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TaskError::Timeout(self.control.id)),
            Err(RecvTimeoutError::Disconnected) => Err(TaskError::Failed(self.control.id)),
        }
    }

    /// Block until the task finishes
    pub fn join(self) -> Result<T, TaskError> {
        if self.control.is_cancelled() {
            return Err(TaskError::Cancelled(self.control.id));
        }
        self.result
            .recv()
            .unwrap_or(Err(TaskError::Failed(self.control.id)))
    }

    pub(crate) fn control(&self) -> Arc<TaskControl> {
        self.control.clone()
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.control.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct PoolState {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    shut_down: bool,
}

/// A bounded set of threads serving one frame's task queue
///
/// Threads are spawned on first submission. After [`shutdown`](Self::shutdown)
/// the pool refuses new work until [`reopen`](Self::reopen)ed.
pub struct WorkerPool {
    name: String,
    size: usize,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size: size.max(1),
            state: Mutex::new(PoolState {
                sender: None,
                workers: Vec::new(),
                shut_down: false,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Number of threads currently owned by the pool
    pub fn thread_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    /// Queue `task`; `on_done` runs on the worker once the task settles
    pub fn submit<T, F, D>(&self, task: F, on_done: D) -> Result<TaskHandle<T>, FrameError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        D: FnOnce(TaskId) + Send + 'static,
    {
        let sender = self.sender()?;
        let control = Arc::new(TaskControl::new(TaskId::next()));
        let (result_tx, result_rx) = bounded(1);

        let job_control = control.clone();
        let job: Job = Box::new(move || {
            let id = job_control.id;
            if !job_control.begin() {
                let _ = result_tx.send(Err(TaskError::Cancelled(id)));
                on_done(id);
                return;
            }
            let result = catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                TaskError::Panicked {
                    task: id,
                    message: panic_message(&*payload),
                }
            });
            job_control.state.store(DONE, Ordering::SeqCst);
            let _ = result_tx.send(result);
            on_done(id);
        });

        sender
            .send(job)
            .map_err(|_| FrameError::PoolShutdown(self.name.clone()))?;
        Ok(TaskHandle {
            control,
            result: result_rx,
        })
    }

    /// Stop accepting work without waiting for running tasks
    ///
    /// Workers finish what they are running, drain the queue (cancelled
    /// tasks settle without running) and exit.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.sender = None;
        let detached = state.workers.len();
        state.workers.clear();
        tracing::debug!(pool = %self.name, detached, "worker pool shut down");
    }

    /// Accept work again after a shutdown
    pub fn reopen(&self) {
        self.state.lock().shut_down = false;
    }

    fn sender(&self) -> Result<Sender<Job>, FrameError> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(FrameError::PoolShutdown(self.name.clone()));
        }
        if let Some(sender) = &state.sender {
            return Ok(sender.clone());
        }

        let (tx, rx) = unbounded::<Job>();
        for index in 0..self.size {
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{index}", self.name))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                });
            match spawned {
                Ok(handle) => state.workers.push(handle),
                Err(err) => {
                    tracing::error!(pool = %self.name, error = %err, "failed to spawn pool worker");
                }
            }
        }
        if state.workers.is_empty() {
            return Err(FrameError::PoolShutdown(self.name.clone()));
        }
        tracing::debug!(pool = %self.name, threads = state.workers.len(), "worker pool started");
        state.sender = Some(tx.clone());
        Ok(tx)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
