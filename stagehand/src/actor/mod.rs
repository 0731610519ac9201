//! Component instances as concurrently executable actors
//!
//! An actor owns lock-guarded private state, a mailbox, and the hooks and
//! method table the evaluator compiled for it. Non-parallel actors run
//! method bodies on the caller's thread. Parallel actors may additionally be
//! [`start`](Actor::start)ed, which spawns a dedicated thread that mounts
//! the actor, runs its entry method and then serves its mailbox until
//! [`stop`](Actor::stop)ped.
//!
//! # Failures
//!
//! A hook or method that fails (or panics) is handed to `on_error` when the
//! actor defines one, and execution continues. Without `on_error` the
//! failure is returned to the caller as [`ActorError::Hook`] and the actor is
//! marked [`ActorStatus::Crashed`]; a crashed actor rejects further method
//! calls until [`restart`](Actor::restart)ed.

mod builder;
mod hooks;
mod mailbox;
mod worker;

pub use builder::ActorBuilder;
pub use hooks::{ErrorHook, Hooks, LifecycleHook, LifecycleHookKind, Method, UpdateHook};
pub use mailbox::Message;

use crate::hook::{guarded, HookResult};
use crate::runtime::{ActorError, ActorResult};
use crate::scope::Scope;
use crate::sync::{Channel, ReentrantLock};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use mailbox::{Envelope, Mailbox};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use stagehand_types::{InstanceId, StateMap, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle state of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Created,
    Mounted,
    /// A worker thread is serving the mailbox
    Running,
    Stopping,
    Stopped,
    /// A failure went unrecovered; terminal until `restart`
    Crashed,
}

struct WorkerHandle {
    handle: JoinHandle<()>,
    // Never sent on; disconnects when the worker thread exits.
    done: Receiver<()>,
    generation: u64,
}

struct ActorInner {
    id: InstanceId,
    parallel: bool,
    state: Mutex<StateMap>,
    hooks: Hooks,
    methods: HashMap<String, Method>,
    entry: Option<String>,
    mailbox: Mailbox,
    status: Mutex<ActorStatus>,
    mounted: AtomicBool,
    // Held across mount/unmount so other threads wait for the hook.
    mounting: ReentrantMutex<()>,
    running: AtomicBool,
    generation: AtomicU64,
    worker: Mutex<Option<WorkerHandle>>,
    frame: RwLock<Option<String>>,
    scope: Scope,
    last_error: Mutex<Option<String>>,
    recovered_errors: AtomicU64,
    poll_interval: Duration,
    join_timeout: Duration,
}

/// A cloneable handle to a component instance
#[derive(Clone)]
pub struct Actor {
    inner: Arc<ActorInner>,
}

impl Actor {
    pub fn builder(id: impl Into<InstanceId>) -> ActorBuilder {
        ActorBuilder::new(id)
    }

    fn from_builder(builder: ActorBuilder) -> Self {
        Self {
            inner: Arc::new(ActorInner {
                id: builder.id,
                parallel: builder.parallel,
                state: Mutex::new(builder.state),
                hooks: builder.hooks,
                methods: builder.methods,
                entry: builder.entry,
                mailbox: Mailbox::new(),
                status: Mutex::new(ActorStatus::Created),
                mounted: AtomicBool::new(false),
                mounting: ReentrantMutex::new(()),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                worker: Mutex::new(None),
                frame: RwLock::new(None),
                scope: Scope::new(),
                last_error: Mutex::new(None),
                recovered_errors: AtomicU64::new(0),
                poll_interval: builder.poll_interval,
                join_timeout: builder.join_timeout,
            }),
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.inner.id
    }

    pub fn is_parallel(&self) -> bool {
        self.inner.parallel
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ActorStatus {
        *self.inner.status.lock()
    }

    pub fn ptr_eq(&self, other: &Actor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.contains_key(name)
    }

    /// Name of the frame this actor is registered with
    pub fn frame(&self) -> Option<String> {
        self.inner.frame.read().clone()
    }

    pub(crate) fn set_frame(&self, frame: Option<String>) {
        *self.inner.frame.write() = frame;
    }

    /// Most recent hook failure, recovered or not
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// How many failures `on_error` has absorbed
    pub fn recovered_errors(&self) -> u64 {
        self.inner.recovered_errors.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run `on_mount` on the calling thread; no-op if already mounted
    ///
    /// A concurrent caller blocks until the first caller's `on_mount` has
    /// finished.
    pub fn mount(&self) -> ActorResult<()> {
        let _mounting = self.inner.mounting.lock();
        if self.inner.mounted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(actor = %self.inner.id, "mounting");
        if let Err(err) = self.run_lifecycle_hook(LifecycleHookKind::Mount) {
            self.inner.mounted.store(false, Ordering::SeqCst);
            return Err(err);
        }
        self.transition(ActorStatus::Mounted, |s| {
            matches!(s, ActorStatus::Created | ActorStatus::Stopped)
        });
        Ok(())
    }

    /// Run `on_unmount`; no-op unless mounted
    pub fn unmount(&self) -> ActorResult<()> {
        let _mounting = self.inner.mounting.lock();
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(actor = %self.inner.id, "unmounting");
        let result = self.run_lifecycle_hook(LifecycleHookKind::Unmount);
        self.transition(ActorStatus::Stopped, |s| s != ActorStatus::Crashed);
        result.map(|_| ())
    }

    /// Run one of the frame lifecycle hooks if the actor defines it
    ///
    /// Returns whether the hook exists.
    pub fn run_lifecycle_hook(&self, kind: LifecycleHookKind) -> ActorResult<bool> {
        let Some(hook) = self.inner.hooks.get(kind) else {
            return Ok(false);
        };
        self.guard(kind.name(), || hook(self))?;
        Ok(true)
    }

    /// Spawn the dedicated worker thread
    ///
    /// Only parallel actors can be started, and only while no worker is
    /// running.
    pub fn start(&self) -> ActorResult<()> {
        if !self.inner.parallel {
            return Err(ActorError::NotParallel(self.inner.id.clone()));
        }
        if self.status() == ActorStatus::Crashed {
            return Err(ActorError::Crashed(self.inner.id.clone()));
        }

        let mut worker = self.inner.worker.lock();
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(ActorError::AlreadyRunning(self.inner.id.clone()));
        }
        if let Some(previous) = worker.take() {
            // A worker that ended on its own (crash) is reaped here.
            let _ = previous.handle.join();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let actor = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("actor-{}", self.inner.id))
            .spawn(move || {
                let _done = done_tx;
                worker::run(actor, generation);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(ActorError::Spawn {
                    actor: self.inner.id.clone(),
                    source,
                });
            }
        };

        *worker = Some(WorkerHandle {
            handle,
            done: done_rx,
            generation,
        });
        self.transition(ActorStatus::Running, |s| s != ActorStatus::Crashed);
        tracing::debug!(actor = %self.inner.id, generation, "worker started");
        Ok(())
    }

    /// Stop the worker thread (if any), then unmount
    ///
    /// The worker notices the stop sentinel at its next mailbox poll; the
    /// join is bounded by the actor's join timeout, after which the thread
    /// is detached.
    pub fn stop(&self) -> ActorResult<()> {
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            self.transition(ActorStatus::Stopping, |s| s == ActorStatus::Running);
            self.inner.running.store(false, Ordering::SeqCst);
            self.inner.mailbox.post(Envelope::Stop(worker.generation));
            self.join_worker(worker);
        }
        self.unmount()
    }

    /// Clear a crash and, for parallel actors, start a fresh worker
    pub fn restart(&self) -> ActorResult<()> {
        {
            let mut status = self.inner.status.lock();
            if *status != ActorStatus::Crashed {
                return Ok(());
            }
            *status = if self.is_mounted() {
                ActorStatus::Mounted
            } else {
                ActorStatus::Created
            };
        }
        tracing::info!(actor = %self.inner.id, "restarting crashed actor");
        if self.inner.parallel {
            self.start()
        } else {
            Ok(())
        }
    }

    fn join_worker(&self, worker: WorkerHandle) {
        if thread::current().id() == worker.handle.thread().id() {
            // Stopping from inside the worker: the loop exits on its own.
            return;
        }
        match worker.done.recv_timeout(self.inner.join_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    actor = %self.inner.id,
                    timeout_ms = self.inner.join_timeout.as_millis() as u64,
                    "worker did not stop in time; detaching"
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
            }
        }
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().get(key).cloned()
    }

    /// Read `key`, falling back to `default` when it is unset
    pub fn get_state_or(&self, key: &str, default: Value) -> Value {
        self.get_state(key).unwrap_or(default)
    }

    pub fn state_snapshot(&self) -> StateMap {
        self.inner.state.lock().clone()
    }

    /// Write one key; `on_update` fires only if the value changed
    ///
    /// Returns whether the state changed.
    pub fn set_state(&self, key: impl Into<String>, value: Value) -> ActorResult<bool> {
        let key = key.into();
        let old = {
            let mut state = self.inner.state.lock();
            if state.get(&key) == Some(&value) {
                return Ok(false);
            }
            let old = state.clone();
            state.insert(key, value);
            old
        };
        self.fire_update(&old)?;
        Ok(true)
    }

    /// Write several keys at once; `on_update` fires at most once
    pub fn update_state(&self, values: StateMap) -> ActorResult<bool> {
        let old = {
            let mut state = self.inner.state.lock();
            let changed = values.iter().any(|(k, v)| state.get(k) != Some(v));
            if !changed {
                return Ok(false);
            }
            let old = state.clone();
            state.extend(values);
            old
        };
        self.fire_update(&old)?;
        Ok(true)
    }

    /// Atomic read-modify-write of the whole state map
    ///
    /// `f` runs under the actor's lock and must not call back into this
    /// actor. `on_update` fires afterwards if anything changed.
    pub fn modify_state<R>(&self, f: impl FnOnce(&mut StateMap) -> R) -> ActorResult<R> {
        let (result, old) = {
            let mut state = self.inner.state.lock();
            let old = state.clone();
            let result = f(&mut state);
            let changed = *state != old;
            (result, changed.then_some(old))
        };
        if let Some(old) = old {
            self.fire_update(&old)?;
        }
        Ok(result)
    }

    fn fire_update(&self, old: &StateMap) -> ActorResult<()> {
        match &self.inner.hooks.on_update {
            Some(hook) => self.guard("on_update", || hook(self, old)),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Dispatch and mailbox
    // ------------------------------------------------------------------

    /// Run the named method on the calling thread
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> ActorResult<Value> {
        if self.status() == ActorStatus::Crashed {
            return Err(ActorError::Crashed(self.inner.id.clone()));
        }
        let body = self
            .inner
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| ActorError::MethodNotFound {
                actor: self.inner.id.clone(),
                method: method.to_string(),
            })?;
        self.guard(method, || body(self, args))
    }

    /// Queue a message for the worker thread (or a later `receive`)
    pub fn send(&self, message: Message) -> ActorResult<()> {
        if self.status() == ActorStatus::Crashed {
            return Err(ActorError::Crashed(self.inner.id.clone()));
        }
        self.inner.mailbox.post(Envelope::Deliver(message));
        Ok(())
    }

    /// Take the next mailbox message, or `None` after `timeout`
    ///
    /// A pending stop request also yields `None`.
    pub fn receive(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inner.mailbox.next(remaining)? {
                Envelope::Deliver(message) => return Some(message),
                Envelope::Stop(generation) if self.is_current_generation(generation) => {
                    return None
                }
                Envelope::Stop(_) if remaining.is_zero() => return None,
                Envelope::Stop(_) => continue,
            }
        }
    }

    pub fn pending_messages(&self) -> usize {
        self.inner.mailbox.len()
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    // ------------------------------------------------------------------
    // Actor-local primitives
    // ------------------------------------------------------------------

    /// Get or create an actor-local channel
    pub fn channel(&self, name: &str, capacity: usize) -> Channel {
        self.inner.scope.channel(name, capacity)
    }

    /// Get or create an actor-local mutex
    pub fn mutex(&self, name: &str) -> ReentrantLock {
        self.inner.scope.mutex(name)
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    /// Run user code at the actor boundary
    ///
    /// A failure is offered to `on_error`; if there is none, or it fails
    /// too, the actor crashes and the error is returned.
    fn guard<T: Default>(&self, hook: &str, f: impl FnOnce() -> HookResult<T>) -> ActorResult<T> {
        match guarded(f) {
            Ok(value) => Ok(value),
            Err(err) => self.recover(hook, err).map(|()| T::default()),
        }
    }

    fn recover(&self, hook: &str, err: anyhow::Error) -> ActorResult<()> {
        *self.inner.last_error.lock() = Some(format!("{hook}: {err:#}"));

        let Some(on_error) = &self.inner.hooks.on_error else {
            self.crash(hook, &err);
            return Err(ActorError::hook(&self.inner.id, hook, err));
        };

        tracing::warn!(actor = %self.inner.id, hook, error = %format!("{err:#}"), "recovered by on_error");
        match guarded(|| on_error(self, &err)) {
            Ok(()) => {
                self.inner.recovered_errors.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(secondary) => {
                let secondary = secondary.context(format!("while handling {hook} failure: {err:#}"));
                self.crash("on_error", &secondary);
                Err(ActorError::hook(&self.inner.id, "on_error", secondary))
            }
        }
    }

    fn crash(&self, hook: &str, err: &anyhow::Error) {
        *self.inner.status.lock() = ActorStatus::Crashed;
        self.inner.running.store(false, Ordering::SeqCst);
        tracing::error!(actor = %self.inner.id, hook, error = %format!("{err:#}"), "actor crashed");
    }

    fn transition(&self, to: ActorStatus, allowed: impl FnOnce(ActorStatus) -> bool) {
        let mut status = self.inner.status.lock();
        if allowed(*status) {
            *status = to;
        }
    }

    fn entry_method(&self) -> Option<&str> {
        self.inner.entry.as_deref()
    }

    fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    fn next_envelope(&self) -> Option<Envelope> {
        self.inner.mailbox.next(self.inner.poll_interval)
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.inner.id)
            .field("parallel", &self.inner.parallel)
            .field("status", &self.status())
            .field("frame", &self.frame())
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}
