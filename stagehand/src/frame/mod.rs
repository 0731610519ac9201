//! Frames: isolated, hierarchically nested groups of components
//!
//! A frame owns a set of actors, its child frames, a worker pool and its own
//! event bus, service registry, context registry and frame state. None of
//! these are shared with the parent frame. Loading a frame mounts its
//! actors; unloading stops them, cascades to child frames depth-first,
//! cancels queued tasks and finally detaches the frame from its parent.

mod pool;
mod registry;
mod report;

pub use pool::{TaskHandle, WorkerPool};
pub use registry::FrameRegistry;
pub use report::{HookFailure, LifecycleReport};

use crate::actor::{Actor, LifecycleHookKind};
use crate::bus::EventBus;
use crate::context::{Ancestry, ContextRegistry};
use crate::hook::HookResult;
use crate::runtime::{ActorResult, FrameError, RuntimeConfig};
use crate::scope::Scope;
use crate::service::{Service, ServiceRegistry};
use crate::sync::{Channel, ReentrantLock};
use indexmap::IndexMap;
use parking_lot::Mutex;
use pool::TaskControl;
use stagehand_types::{InstanceId, TaskId, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Lifecycle phase of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

struct FrameInner {
    name: String,
    parent: Mutex<Option<Weak<FrameInner>>>,
    children: Mutex<Vec<Frame>>,
    actors: Mutex<IndexMap<String, Actor>>,
    state: Service,
    events: EventBus,
    services: ServiceRegistry,
    contexts: ContextRegistry,
    scope: Scope,
    pool: WorkerPool,
    tasks: Mutex<HashMap<TaskId, Arc<TaskControl>>>,
    phase: Mutex<FramePhase>,
}

/// A cloneable handle to a frame
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// Create an unloaded frame with no parent
    ///
    /// `ancestry` is the component parent relation the frame's contexts
    /// resolve providers through.
    pub fn new(name: impl Into<String>, config: &RuntimeConfig, ancestry: Arc<dyn Ancestry>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(FrameInner {
                state: Service::new(format!("{name}:state")),
                events: EventBus::new(),
                services: ServiceRegistry::new(),
                contexts: ContextRegistry::new(ancestry),
                scope: Scope::new(),
                pool: WorkerPool::new(format!("frame-{name}"), config.frame_pool_size),
                tasks: Mutex::new(HashMap::new()),
                phase: Mutex::new(FramePhase::Unloaded),
                parent: Mutex::new(None),
                children: Mutex::new(Vec::new()),
                actors: Mutex::new(IndexMap::new()),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn phase(&self) -> FramePhase {
        *self.inner.phase.lock()
    }

    pub fn is_loaded(&self) -> bool {
        self.phase() == FramePhase::Loaded
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Frame> {
        self.inner
            .parent
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Frame { inner })
    }

    pub fn parent_name(&self) -> Option<String> {
        self.parent().map(|p| p.name().to_string())
    }

    /// Adopt `child`, detaching it from any previous parent
    pub fn add_child(&self, child: &Frame) {
        if child.ptr_eq(self) {
            tracing::warn!(frame = %self.inner.name, "refusing to parent a frame to itself");
            return;
        }
        if let Some(previous) = child.parent() {
            if previous.ptr_eq(self) {
                return;
            }
            previous.detach_child(child);
        }
        *child.inner.parent.lock() = Some(Arc::downgrade(&self.inner));
        self.inner.children.lock().push(child.clone());
    }

    /// Release the named child; it keeps running but has no parent
    pub fn remove_child(&self, name: &str) -> Option<Frame> {
        let removed = {
            let mut children = self.inner.children.lock();
            let index = children.iter().position(|c| c.name() == name)?;
            children.remove(index)
        };
        *removed.inner.parent.lock() = None;
        Some(removed)
    }

    pub fn children(&self) -> Vec<Frame> {
        self.inner.children.lock().clone()
    }

    pub fn child(&self, name: &str) -> Option<Frame> {
        self.inner
            .children
            .lock()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    fn detach_child(&self, child: &Frame) {
        self.inner.children.lock().retain(|c| !c.ptr_eq(child));
        *child.inner.parent.lock() = None;
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Register `actor` under `id`
    ///
    /// An actor previously registered under the same id is stopped and
    /// released. Adding to a loaded frame mounts the actor immediately.
    pub fn add_component(&self, id: impl Into<String>, actor: Actor) -> ActorResult<()> {
        let id = id.into();
        actor.set_frame(Some(self.inner.name.clone()));
        let replaced = self.inner.actors.lock().insert(id.clone(), actor.clone());
        if let Some(old) = replaced {
            if !old.ptr_eq(&actor) {
                old.set_frame(None);
                if let Err(err) = old.stop() {
                    tracing::warn!(frame = %self.inner.name, component = %id, error = %err, "replaced component failed to stop");
                }
            }
        }
        tracing::debug!(frame = %self.inner.name, component = %id, "component added");
        if self.is_loaded() {
            actor.mount()?;
        }
        Ok(())
    }

    /// Deregister a component; the caller takes over its lifecycle
    pub fn remove_component(&self, id: &str) -> Option<Actor> {
        let actor = self.inner.actors.lock().shift_remove(id)?;
        actor.set_frame(None);
        Some(actor)
    }

    pub fn component(&self, id: &str) -> Option<Actor> {
        self.inner.actors.lock().get(id).cloned()
    }

    /// Component ids in registration order
    pub fn component_ids(&self) -> Vec<String> {
        self.inner.actors.lock().keys().cloned().collect()
    }

    fn actors(&self) -> Vec<Actor> {
        self.inner.actors.lock().values().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Mount every component and run the frame load hooks
    ///
    /// No-op unless the frame is unloaded. Hooks run in registration order;
    /// a failing hook is recorded and the cascade continues.
    pub fn load(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        {
            let mut phase = self.inner.phase.lock();
            if *phase != FramePhase::Unloaded {
                return report;
            }
            *phase = FramePhase::Loading;
        }
        tracing::debug!(frame = %self.inner.name, "loading");
        self.inner.pool.reopen();

        let actors = self.actors();
        self.run_hook(&actors, LifecycleHookKind::FrameWillLoad, &mut report);
        for actor in &actors {
            if let Err(err) = actor.mount() {
                report.record(&self.inner.name, actor.id(), LifecycleHookKind::Mount, err.to_string());
            }
        }
        *self.inner.phase.lock() = FramePhase::Loaded;
        self.run_hook(&actors, LifecycleHookKind::FrameDidLoad, &mut report);

        tracing::debug!(frame = %self.inner.name, actors = actors.len(), failures = report.failures.len(), "loaded");
        report
    }

    /// Tear the frame down and detach it from its parent
    ///
    /// No-op unless the frame is loaded, so a second call does nothing.
    pub fn unload(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        {
            let mut phase = self.inner.phase.lock();
            if *phase != FramePhase::Loaded {
                return report;
            }
            *phase = FramePhase::Unloading;
        }
        tracing::debug!(frame = %self.inner.name, "unloading");

        let actors = self.actors();
        self.run_hook(&actors, LifecycleHookKind::FrameWillUnload, &mut report);
        for actor in &actors {
            if let Err(err) = actor.stop() {
                report.record(&self.inner.name, actor.id(), LifecycleHookKind::Unmount, err.to_string());
            }
        }

        for child in self.children() {
            report.merge(child.unload());
        }

        let cancelled = self.cancel_pending_tasks();
        self.inner.pool.shutdown();
        let closed = self.inner.scope.close_channels();

        *self.inner.phase.lock() = FramePhase::Unloaded;
        self.run_hook(&actors, LifecycleHookKind::FrameDidUnload, &mut report);

        if let Some(parent) = self.parent() {
            parent.detach_child(self);
        }
        tracing::debug!(frame = %self.inner.name, cancelled, closed, failures = report.failures.len(), "unloaded");
        report
    }

    /// Unload if loaded, then release the frame whatever its phase
    ///
    /// Used when the registry forgets a frame: queued tasks are cancelled,
    /// the pool is shut down and the frame leaves its parent even if it was
    /// never loaded.
    pub fn dispose(&self) -> LifecycleReport {
        let report = self.unload();
        self.cancel_pending_tasks();
        self.inner.pool.shutdown();
        self.inner.scope.close_channels();
        if let Some(parent) = self.parent() {
            parent.detach_child(self);
        }
        report
    }

    fn run_hook(&self, actors: &[Actor], kind: LifecycleHookKind, report: &mut LifecycleReport) {
        for actor in actors {
            if let Err(err) = actor.run_lifecycle_hook(kind) {
                report.record(&self.inner.name, actor.id(), kind, err.to_string());
            }
        }
    }

    fn cancel_pending_tasks(&self) -> usize {
        let tasks: Vec<Arc<TaskControl>> = self.inner.tasks.lock().values().cloned().collect();
        tasks.iter().filter(|task| task.cancel()).count()
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Run `task` on the frame's worker pool
    ///
    /// The handle stays tracked until the task settles, so `unload` can
    /// cancel it while it is still queued.
    pub fn run_in_frame<T, F>(&self, task: F) -> Result<TaskHandle<T>, FrameError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let frame = Arc::downgrade(&self.inner);
        let handle = self.inner.pool.submit(task, move |id| {
            if let Some(inner) = frame.upgrade() {
                inner.tasks.lock().remove(&id);
            }
        })?;

        self.inner.tasks.lock().insert(handle.id(), handle.control());
        // The task may have settled before it was tracked.
        if handle.is_finished() {
            self.inner.tasks.lock().remove(&handle.id());
        }
        Ok(handle)
    }

    /// Tasks submitted and not yet settled
    pub fn outstanding_tasks(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    // ------------------------------------------------------------------
    // Frame state
    // ------------------------------------------------------------------

    pub fn get_frame_state(&self, key: &str) -> Option<Value> {
        self.inner.state.get(key)
    }

    pub fn get_frame_state_or(&self, key: &str, default: Value) -> Value {
        self.inner.state.get_or(key, default)
    }

    pub fn set_frame_state(&self, key: &str, value: Value) -> bool {
        self.inner.state.set(key, value)
    }

    pub fn subscribe_to_frame_state<F>(&self, subscriber: InstanceId, callback: F)
    where
        F: Fn(&str, &Value, Option<&Value>) -> HookResult + Send + Sync + 'static,
    {
        self.inner.state.subscribe(subscriber, callback);
    }

    pub fn unsubscribe_from_frame_state(&self, subscriber: &InstanceId) -> bool {
        self.inner.state.unsubscribe(subscriber)
    }

    pub fn frame_state(&self) -> &Service {
        &self.inner.state
    }

    // ------------------------------------------------------------------
    // Events and scoped registries
    // ------------------------------------------------------------------

    pub fn emit_event(&self, event: &str, data: &Value) -> usize {
        self.inner.events.emit(event, data)
    }

    pub fn on_event<F>(&self, event: &str, owner: InstanceId, callback: F)
    where
        F: Fn(&Value) -> HookResult + Send + Sync + 'static,
    {
        self.inner.events.on(event, owner, callback);
    }

    pub fn off_event(&self, event: &str, owner: &InstanceId) -> usize {
        self.inner.events.off(event, owner)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.services
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.inner.contexts
    }

    /// Get or create a frame-global channel
    pub fn channel(&self, name: &str, capacity: usize) -> Channel {
        self.inner.scope.channel(name, capacity)
    }

    /// Get or create a frame-global mutex
    pub fn mutex(&self, name: &str) -> ReentrantLock {
        self.inner.scope.mutex(name)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("name", &self.inner.name)
            .field("phase", &self.phase())
            .field("parent", &self.parent_name())
            .field("components", &self.component_ids())
            .field(
                "children",
                &self.children().iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
