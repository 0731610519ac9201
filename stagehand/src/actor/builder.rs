//! Construction of actors from evaluator-compiled parts

use super::hooks::{Hooks, LifecycleHookKind, Method};
use super::Actor;
use crate::hook::HookResult;
use crate::runtime::RuntimeConfig;
use stagehand_types::{InstanceId, StateMap, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Actor`]
///
/// ```
/// use stagehand::Actor;
/// use serde_json::json;
///
/// let counter = Actor::builder("counter")
///     .with_state("count", json!(0))
///     .method("increment", |actor, _args| {
///         actor.modify_state(|state| {
///             let next = state["count"].as_i64().unwrap_or(0) + 1;
///             state.insert("count".into(), json!(next));
///         })?;
///         Ok(json!(null))
///     })
///     .build();
///
/// counter.invoke("increment", vec![]).unwrap();
/// assert_eq!(counter.get_state("count"), Some(json!(1)));
/// ```
pub struct ActorBuilder {
    pub(super) id: InstanceId,
    pub(super) state: StateMap,
    pub(super) parallel: bool,
    pub(super) hooks: Hooks,
    pub(super) methods: HashMap<String, Method>,
    pub(super) entry: Option<String>,
    pub(super) poll_interval: Duration,
    pub(super) join_timeout: Duration,
}

impl ActorBuilder {
    pub fn new(id: impl Into<InstanceId>) -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            id: id.into(),
            state: StateMap::new(),
            parallel: false,
            hooks: Hooks::default(),
            methods: HashMap::new(),
            entry: None,
            poll_interval: defaults.poll_interval(),
            join_timeout: defaults.join_timeout(),
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn with_initial_state(mut self, state: StateMap) -> Self {
        self.state.extend(state);
        self
    }

    /// Mark the actor as able to run on its own thread
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Method the worker thread invokes once before polling the mailbox
    pub fn entry(mut self, method: impl Into<String>) -> Self {
        self.entry = Some(method.into());
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Actor, Vec<Value>) -> HookResult<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(body));
        self
    }

    pub fn hook<F>(mut self, kind: LifecycleHookKind, hook: F) -> Self
    where
        F: Fn(&Actor) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.lifecycle.insert(kind, Arc::new(hook));
        self
    }

    pub fn on_mount<F>(self, hook: F) -> Self
    where
        F: Fn(&Actor) -> HookResult + Send + Sync + 'static,
    {
        self.hook(LifecycleHookKind::Mount, hook)
    }

    pub fn on_unmount<F>(self, hook: F) -> Self
    where
        F: Fn(&Actor) -> HookResult + Send + Sync + 'static,
    {
        self.hook(LifecycleHookKind::Unmount, hook)
    }

    pub fn on_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Actor, &StateMap) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.on_update = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Actor, &anyhow::Error) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Take mailbox timing from a runtime configuration
    pub fn with_config(self, config: &RuntimeConfig) -> Self {
        self.poll_interval(config.poll_interval())
            .join_timeout(config.join_timeout())
    }

    pub fn build(self) -> Actor {
        Actor::from_builder(self)
    }
}
