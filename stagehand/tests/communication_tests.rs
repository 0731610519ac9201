//! Integration tests for channels, events, services and contexts

mod common;

use common::init_tracing;
use serde_json::json;
use stagehand::{Channel, ChannelError, EventBus, InstanceId, Runtime, Service, StateMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_bounded_channel_handoff() {
    init_tracing();
    let channel = Channel::new(1);
    channel.send(json!("a")).unwrap();

    let sender = channel.clone();
    let blocked = thread::spawn(move || {
        sender.send(json!("b")).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished());
    assert_eq!(channel.len(), 1);

    assert_eq!(channel.receive(None), Some(json!("a")));
    blocked.join().unwrap();
    assert_eq!(channel.receive(Some(Duration::from_secs(1))), Some(json!("b")));
}

#[test]
fn test_closed_channel_drains_then_ends() {
    let channel = Channel::unbounded();
    channel.send(json!(1)).unwrap();
    channel.send(json!(2)).unwrap();
    channel.close();

    assert_eq!(channel.send(json!(3)), Err(ChannelError::Closed));
    assert_eq!(channel.receive(None), Some(json!(1)));
    assert_eq!(channel.receive(None), Some(json!(2)));
    assert_eq!(channel.receive(None), None);
}

#[test]
fn test_receive_timeout_is_not_an_error() {
    let channel = Channel::new(0);
    assert_eq!(channel.receive(Some(Duration::from_millis(20))), None);
    assert!(!channel.is_closed());
}

#[test]
fn test_emit_survives_failing_listener() {
    init_tracing();
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let order = order.clone();
        bus.on("tick", InstanceId::new(format!("l{i}")), move |_| {
            if i == 2 {
                anyhow::bail!("listener {i} failed");
            }
            order.lock().unwrap().push(i);
            Ok(())
        });
    }

    assert_eq!(bus.emit("tick", &json!(null)), 4);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 3, 4]);
}

#[test]
fn test_global_and_frame_buses_are_isolated() {
    let runtime = Runtime::with_defaults();
    let frame = runtime.create_frame("root", None).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    runtime.events().on("saved", InstanceId::new("g"), move |_| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(frame.emit_event("saved", &json!({})), 0);
    assert_eq!(runtime.events().emit("saved", &json!({})), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_service_notifies_only_on_change() {
    init_tracing();
    let service = Service::new("settings");
    let updates = Arc::new(Mutex::new(Vec::new()));
    let updates_clone = updates.clone();
    service.subscribe(InstanceId::new("ui"), move |key, new, old| {
        updates_clone
            .lock()
            .unwrap()
            .push((key.to_string(), new.clone(), old.cloned()));
        Ok(())
    });

    assert!(service.set("volume", json!([1, 2])));
    assert!(!service.set("volume", json!([1, 2])));
    assert!(service.set("volume", json!([3])));

    let mut batch = StateMap::new();
    batch.insert("volume".into(), json!([3]));
    batch.insert("muted".into(), json!(false));
    assert_eq!(service.update(batch), 1);

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[0], ("volume".into(), json!([1, 2]), None));
    assert_eq!(updates[1], ("volume".into(), json!([3]), Some(json!([1, 2]))));
    assert_eq!(updates[2], ("muted".into(), json!(false), None));
}

#[test]
fn test_service_registry_round_trip() {
    let runtime = Runtime::with_defaults();
    let registered = Arc::new(Service::new("auth"));
    assert!(runtime.services().register(registered.clone()).is_none());
    assert!(Arc::ptr_eq(&runtime.services().get("auth").unwrap(), &registered));
    assert!(runtime.services().unregister("auth").is_some());
    assert!(runtime.services().get("auth").is_none());
}

#[test]
fn test_theme_context_scenario() {
    init_tracing();
    let runtime = Runtime::with_defaults();
    runtime.set_parent("C", "P");

    let theme = runtime.contexts().create("theme", json!("light"));
    theme.provide(InstanceId::new("P"), json!("dark"));

    assert_eq!(theme.consume(InstanceId::new("C"), |_| Ok(())), json!("dark"));
    assert_eq!(theme.consume(InstanceId::new("D"), |_| Ok(())), json!("light"));
}

#[test]
fn test_context_pushes_nearest_value_on_provide() {
    let runtime = Runtime::with_defaults();
    runtime.set_parent("leaf", "mid");
    runtime.set_parent("mid", "root");

    let theme = runtime.contexts().create("theme", json!("light"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    theme.consume(InstanceId::new("leaf"), move |value| {
        seen_clone.lock().unwrap().push(value.clone());
        Ok(())
    });

    theme.provide(InstanceId::new("mid"), json!("sepia"));
    // Still notified, but the nearer provider keeps winning.
    theme.provide(InstanceId::new("root"), json!("dark"));
    theme.stop_providing(&InstanceId::new("mid"));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!("sepia"), json!("sepia"), json!("dark")]
    );
}

#[test]
fn test_frame_contexts_are_isolated_from_global() {
    let runtime = Runtime::with_defaults();
    let frame = runtime.create_frame("root", None).unwrap();

    runtime.contexts().create("locale", json!("en"));
    assert!(frame.contexts().get("locale").is_none());

    let local = frame.contexts().create("locale", json!("fr"));
    assert_eq!(local.resolve(&InstanceId::new("anyone")), json!("fr"));
}
