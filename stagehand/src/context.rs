//! Ancestor-scoped value propagation
//!
//! A context carries a value from a provider down to every consumer beneath
//! it in the component hierarchy. A consumer sees the value of its *nearest*
//! providing ancestor, or the context default when no ancestor provides.
//!
//! The hierarchy itself is not owned here: resolution walks an [`Ancestry`]
//! relation supplied by whoever builds the component tree.

use crate::hook::{isolated, HookResult};
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use stagehand_types::{InstanceId, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Read-only parent relation used for nearest-provider resolution
pub trait Ancestry: Send + Sync {
    fn parent_of(&self, id: &InstanceId) -> Option<InstanceId>;
}

/// The default parent relation: an explicit child → parent table
///
/// The evaluator records parentage as it instantiates components. Entries
/// are identifiers only; nothing here keeps a component alive.
#[derive(Debug, Default)]
pub struct Lineage {
    parents: RwLock<HashMap<InstanceId, InstanceId>>,
}

impl Lineage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parent(&self, child: InstanceId, parent: InstanceId) {
        self.parents.write().insert(child, parent);
    }

    pub fn clear_parent(&self, child: &InstanceId) -> Option<InstanceId> {
        self.parents.write().remove(child)
    }
}

impl Ancestry for Lineage {
    fn parent_of(&self, id: &InstanceId) -> Option<InstanceId> {
        self.parents.read().get(id).cloned()
    }
}

/// Callback handed the consumer's resolved value
pub type ContextCallback = Arc<dyn Fn(&Value) -> HookResult + Send + Sync>;

pub struct Context {
    name: String,
    default: Value,
    ancestry: Arc<dyn Ancestry>,
    providers: Mutex<HashMap<InstanceId, Value>>,
    consumers: Mutex<IndexMap<InstanceId, Vec<ContextCallback>>>,
    notifying: ReentrantMutex<()>,
}

impl Context {
    pub fn new(name: impl Into<String>, default: Value, ancestry: Arc<dyn Ancestry>) -> Self {
        Self {
            name: name.into(),
            default,
            ancestry,
            providers: Mutex::new(HashMap::new()),
            consumers: Mutex::new(IndexMap::new()),
            notifying: ReentrantMutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Record `value` as provided by `provider`
    ///
    /// When the value differs from what `provider` supplied before, every
    /// consumer is re-resolved and notified. Returns whether it changed.
    pub fn provide(&self, provider: InstanceId, value: Value) -> bool {
        let _serial = self.notifying.lock();
        let previous = self.providers.lock().insert(provider.clone(), value.clone());
        if previous.as_ref() == Some(&value) {
            return false;
        }
        tracing::debug!(context = %self.name, provider = %provider, "context provided");
        self.notify_consumers();
        true
    }

    /// Withdraw `provider`'s value; consumers are re-resolved if it existed
    pub fn stop_providing(&self, provider: &InstanceId) -> bool {
        let _serial = self.notifying.lock();
        if self.providers.lock().remove(provider).is_none() {
            return false;
        }
        self.notify_consumers();
        true
    }

    /// Register `callback` for `consumer` and return its current value
    pub fn consume<F>(&self, consumer: InstanceId, callback: F) -> Value
    where
        F: Fn(&Value) -> HookResult + Send + Sync + 'static,
    {
        self.consumers
            .lock()
            .entry(consumer.clone())
            .or_default()
            .push(Arc::new(callback));
        self.resolve(&consumer)
    }

    pub fn stop_consuming(&self, consumer: &InstanceId) -> bool {
        self.consumers.lock().shift_remove(consumer).is_some()
    }

    /// The value `consumer` would see right now
    ///
    /// Walks the consumer's ancestors nearest-first and returns the first
    /// provided value, or the default. The consumer's own provided value is
    /// not considered; a component never consumes from itself.
    pub fn resolve(&self, consumer: &InstanceId) -> Value {
        let providers = self.providers.lock();
        let mut seen = HashSet::new();
        let mut current = self.ancestry.parent_of(consumer);
        while let Some(ancestor) = current {
            if let Some(value) = providers.get(&ancestor) {
                return value.clone();
            }
            if !seen.insert(ancestor.clone()) {
                break;
            }
            current = self.ancestry.parent_of(&ancestor);
        }
        self.default.clone()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.lock().len()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    fn notify_consumers(&self) {
        let snapshot: Vec<(InstanceId, Vec<ContextCallback>)> = self
            .consumers
            .lock()
            .iter()
            .map(|(id, callbacks)| (id.clone(), callbacks.clone()))
            .collect();
        for (consumer, callbacks) in snapshot {
            let resolved = self.resolve(&consumer);
            for callback in callbacks {
                isolated(&self.name, || callback(&resolved));
            }
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("providers", &self.provider_count())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

/// Name-keyed table of contexts sharing one parent relation
pub struct ContextRegistry {
    ancestry: Arc<dyn Ancestry>,
    contexts: Mutex<HashMap<String, Arc<Context>>>,
}

impl ContextRegistry {
    pub fn new(ancestry: Arc<dyn Ancestry>) -> Self {
        Self {
            ancestry,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Get the named context, creating it with `default` on first call
    ///
    /// The default of an existing context is left untouched.
    pub fn create(&self, name: &str, default: Value) -> Arc<Context> {
        self.contexts
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Context::new(name, default, self.ancestry.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Context>> {
        self.contexts.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Context>> {
        self.contexts.lock().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.contexts.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.names())
            .finish()
    }
}
