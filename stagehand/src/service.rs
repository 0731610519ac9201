//! Named shared state with change subscription
//!
//! A service is a key/value map shared by any number of components.
//! Subscribers hear about a write only when the stored value actually
//! changes (deep equality), in subscription order, each isolated from the
//! failures of the others.
//!
//! A subscriber may write to the service it is being notified by. The
//! nested change is queued and delivered once every subscriber has seen the
//! current one, so each subscriber observes changes in write order.

use crate::hook::{isolated, HookResult};
use parking_lot::{Mutex, ReentrantMutex};
use stagehand_types::{InstanceId, StateMap, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Subscriber callback: `(key, new_value, old_value)`
pub type ServiceCallback = Arc<dyn Fn(&str, &Value, Option<&Value>) -> HookResult + Send + Sync>;

struct Change {
    key: String,
    new: Value,
    old: Option<Value>,
}

pub struct Service {
    name: String,
    state: Mutex<StateMap>,
    subscribers: Mutex<Vec<(InstanceId, ServiceCallback)>>,
    // Serializes write+notify so subscribers observe writes in order.
    writing: ReentrantMutex<()>,
    // Only touched by the thread holding `writing`.
    pending: Mutex<VecDeque<Change>>,
    dispatching: AtomicBool,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_state(name, StateMap::new())
    }

    pub fn with_state(name: impl Into<String>, state: StateMap) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(state),
            subscribers: Mutex::new(Vec::new()),
            writing: ReentrantMutex::new(()),
            pending: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Read `key`, falling back to `default` when it is unset
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Write `key`; returns whether the stored value changed
    pub fn set(&self, key: &str, value: Value) -> bool {
        let _serial = self.writing.lock();
        let old = self.state.lock().insert(key.to_string(), value.clone());
        if old.as_ref() == Some(&value) {
            return false;
        }
        self.notify(vec![Change {
            key: key.to_string(),
            new: value,
            old,
        }]);
        true
    }

    /// Write several keys; returns how many of them changed
    pub fn update(&self, values: StateMap) -> usize {
        let _serial = self.writing.lock();
        let mut changes = Vec::new();
        {
            let mut state = self.state.lock();
            for (key, value) in values {
                let old = state.insert(key.clone(), value.clone());
                if old.as_ref() != Some(&value) {
                    changes.push(Change { key, new: value, old });
                }
            }
        }
        let changed = changes.len();
        self.notify(changes);
        changed
    }

    /// Delete `key`; subscribers see the removal as a change to null
    pub fn remove(&self, key: &str) -> Option<Value> {
        let _serial = self.writing.lock();
        let old = self.state.lock().remove(key);
        if let Some(old) = &old {
            self.notify(vec![Change {
                key: key.to_string(),
                new: Value::Null,
                old: Some(old.clone()),
            }]);
        }
        old
    }

    pub fn snapshot(&self) -> StateMap {
        self.state.lock().clone()
    }

    pub fn subscribe<F>(&self, subscriber: InstanceId, callback: F)
    where
        F: Fn(&str, &Value, Option<&Value>) -> HookResult + Send + Sync + 'static,
    {
        self.subscribers.lock().push((subscriber, Arc::new(callback)));
    }

    /// Drop every subscription held by `subscriber`
    pub fn unsubscribe(&self, subscriber: &InstanceId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(id, _)| id != subscriber);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Queue `changes` and, unless a pass is already running on this
    /// thread, deliver the queue in order. Callers hold `writing`.
    fn notify(&self, changes: Vec<Change>) {
        self.pending.lock().extend(changes);
        if self.dispatching.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let Some(change) = self.pending.lock().pop_front() else {
                break;
            };
            let snapshot: Vec<ServiceCallback> = self
                .subscribers
                .lock()
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();
            tracing::trace!(service = %self.name, key = %change.key, subscribers = snapshot.len(), "service changed");
            for callback in snapshot {
                isolated(&self.name, || callback(&change.key, &change.new, change.old.as_ref()));
            }
        }
        self.dispatching.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("keys", &self.state.lock().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Name-keyed table of services
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, Arc<Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under its own name, returning any service it replaced
    pub fn register(&self, service: Arc<Service>) -> Option<Arc<Service>> {
        let name = service.name().to_string();
        self.services.lock().insert(name, service)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.services.lock().get(name).cloned()
    }

    /// Get the named service, creating an empty one on first access
    pub fn get_or_create(&self, name: &str) -> Arc<Service> {
        self.services
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Service::new(name)))
            .clone()
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Service>> {
        self.services.lock().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.services.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
