//! Synchronous publish/subscribe keyed by event name
//!
//! Listeners run on the emitting thread, in registration order. A failing or
//! panicking listener is logged and skipped; the rest still run.
//!
//! Emissions are serialized by a reentrant emission lock, and the listener
//! list is snapshotted before callbacks run. A listener may therefore call
//! `on`, `off` or `emit` on the same bus; changes it makes apply to later
//! emissions, not the one in progress.

use crate::hook::{isolated, HookResult};
use parking_lot::{Mutex, ReentrantMutex};
use stagehand_types::{InstanceId, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked with the emitted payload
pub type EventCallback = Arc<dyn Fn(&Value) -> HookResult + Send + Sync>;

#[derive(Clone)]
struct Listener {
    owner: InstanceId,
    callback: EventCallback,
}

pub struct EventBus {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    emitting: ReentrantMutex<()>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            emitting: ReentrantMutex::new(()),
        }
    }

    /// Register `callback` for `event` under `owner`
    pub fn on<F>(&self, event: &str, owner: InstanceId, callback: F)
    where
        F: Fn(&Value) -> HookResult + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Listener {
                owner,
                callback: Arc::new(callback),
            });
    }

    /// Remove every listener `owner` registered for `event`
    ///
    /// Returns the number of listeners removed.
    pub fn off(&self, event: &str, owner: &InstanceId) -> usize {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(event) else {
            return 0;
        };
        let before = list.len();
        list.retain(|l| &l.owner != owner);
        let removed = before - list.len();
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Remove `owner` from every event
    pub fn off_all(&self, owner: &InstanceId) -> usize {
        let mut listeners = self.listeners.lock();
        let mut removed = 0;
        for list in listeners.values_mut() {
            let before = list.len();
            list.retain(|l| &l.owner != owner);
            removed += before - list.len();
        }
        listeners.retain(|_, list| !list.is_empty());
        removed
    }

    /// Invoke every listener for `event` with `data`
    ///
    /// Returns the number of listeners that completed without error.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        let _serial = self.emitting.lock();
        let snapshot: Vec<Listener> = match self.listeners.lock().get(event) {
            Some(list) => list.clone(),
            None => return 0,
        };

        tracing::trace!(event, listeners = snapshot.len(), "emit");
        snapshot
            .iter()
            .filter(|listener| isolated(event, || (listener.callback)(data)))
            .count()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Names of events that currently have listeners
    pub fn events(&self) -> Vec<String> {
        self.listeners.lock().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.events())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> EventCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| -> EventCallback {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Arc::new(move |_data: &Value| {
                log.lock().push(tag.clone());
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        for tag in ["a", "b", "c"] {
            let cb = make(tag);
            bus.on("tick", InstanceId::new(tag), move |d| cb(d));
        }

        assert_eq!(bus.emit("tick", &json!(null)), 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let (log, make) = recorder();

        let first = make("first");
        bus.on("save", InstanceId::new("1"), move |d| first(d));
        bus.on("save", InstanceId::new("2"), |_| anyhow::bail!("listener failed"));
        bus.on("save", InstanceId::new("3"), |_| panic!("listener panicked"));
        let last = make("last");
        bus.on("save", InstanceId::new("4"), move |d| last(d));

        assert_eq!(bus.emit("save", &json!({"doc": 1})), 2);
        assert_eq!(*log.lock(), vec!["first", "last"]);
    }

    #[test]
    fn test_off_removes_all_for_owner() {
        let bus = EventBus::new();
        let owner = InstanceId::new("owner");
        bus.on("e", owner.clone(), |_| Ok(()));
        bus.on("e", owner.clone(), |_| Ok(()));
        bus.on("e", InstanceId::new("other"), |_| Ok(()));

        assert_eq!(bus.off("e", &owner), 2);
        assert_eq!(bus.listener_count("e"), 1);
        assert_eq!(bus.off("missing", &owner), 0);
    }

    #[test]
    fn test_off_all() {
        let bus = EventBus::new();
        let owner = InstanceId::new("owner");
        bus.on("a", owner.clone(), |_| Ok(()));
        bus.on("b", owner.clone(), |_| Ok(()));

        assert_eq!(bus.off_all(&owner), 2);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn test_payload_delivered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        bus.on("data", InstanceId::new("l"), move |d| {
            *seen_clone.lock() = Some(d.clone());
            Ok(())
        });

        bus.emit("data", &json!([1, 2, 3]));
        assert_eq!(*seen.lock(), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_listener_may_reenter_bus() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(Mutex::new(0));

        let inner_bus = bus.clone();
        bus.on("outer", InstanceId::new("l"), move |_| {
            inner_bus.emit("inner", &json!(null));
            inner_bus.on("outer", InstanceId::new("late"), |_| Ok(()));
            Ok(())
        });
        let count_clone = count.clone();
        bus.on("inner", InstanceId::new("l"), move |_| {
            *count_clone.lock() += 1;
            Ok(())
        });

        assert_eq!(bus.emit("outer", &json!(null)), 1);
        assert_eq!(*count.lock(), 1);
        assert_eq!(bus.listener_count("outer"), 2);
    }
}
