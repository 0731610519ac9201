//! Stagehand - concurrency runtime for component-based scripts
//!
//! This crate provides the execution layer beneath a component scripting
//! language. The evaluator compiles script components into [`Actor`]s and
//! drives them through this runtime; everything here is independent of the
//! language itself.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Runtime                            │
//! │   global EventBus · ServiceRegistry · ContextRegistry        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                        FrameRegistry                         │
//! │  ┌───────────────────────────┐                               │
//! │  │ Frame "root"              │   own bus, services, contexts │
//! │  │  ┌───────┐ ┌───────┐      │   frame state, worker pool    │
//! │  │  │ Actor │ │ Actor │ ...  │                               │
//! │  │  └───────┘ └───────┘      │                               │
//! │  │  ┌──────────────────────┐ │                               │
//! │  │  │ Frame "panel" (child)│ │                               │
//! │  │  └──────────────────────┘ │                               │
//! │  └───────────────────────────┘                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! ## Actors
//!
//! An **actor** is one component instance: lock-guarded state, a mailbox,
//! a method table and optional lifecycle hooks. Non-parallel actors run on
//! the caller's thread; parallel actors can be started on a thread of
//! their own that serves the mailbox.
//!
//! ## Frames
//!
//! A **frame** groups actors and child frames. Loading mounts its actors;
//! unloading stops them, cascades to children and cancels queued tasks.
//! Each frame has its own primitives, isolated from its parent.
//!
//! ## Communication
//!
//! - [`EventBus`]: synchronous publish/subscribe by event name
//! - [`Service`]: shared key/value state with change subscriptions
//! - [`Context`]: values propagated from the nearest providing ancestor
//! - [`Channel`] and [`ReentrantLock`]: blocking primitives for script code
//!
//! # Example
//!
//! ```rust
//! use stagehand::{Runtime, Message};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let runtime = Runtime::with_defaults();
//! runtime.create_frame("root", None).unwrap();
//!
//! let worker = runtime
//!     .actor("worker")
//!     .parallel(true)
//!     .poll_interval(Duration::from_millis(10))
//!     .method("store", |actor, args| {
//!         actor.set_state("last", args[0].clone())?;
//!         Ok(json!(null))
//!     })
//!     .build();
//! runtime.add_component("root", "worker", worker.clone()).unwrap();
//! let _ = runtime.load_frame("root").unwrap();
//!
//! worker.start().unwrap();
//! worker.send(Message::new("store", vec![json!(42)])).unwrap();
//! while worker.get_state("last").is_none() {
//!     std::thread::sleep(Duration::from_millis(5));
//! }
//!
//! let report = runtime.shutdown();
//! assert!(report.is_clean());
//! assert!(!worker.is_running());
//! ```

// Modules
pub mod actor;
pub mod bus;
pub mod context;
pub mod frame;
pub mod hook;
pub mod runtime;
pub mod scope;
pub mod service;
pub mod sync;

// Re-exports for convenience
pub use actor::{Actor, ActorBuilder, ActorStatus, Hooks, LifecycleHookKind, Message};
pub use bus::{EventBus, EventCallback};
pub use context::{Ancestry, Context, ContextCallback, ContextRegistry, Lineage};
pub use frame::{
    Frame, FramePhase, FrameRegistry, HookFailure, LifecycleReport, TaskHandle, WorkerPool,
};
pub use hook::{guarded, HookResult};
pub use runtime::{
    ActorError, ChannelError, ConfigError, DuplicateFramePolicy, FrameError, LockError,
    NotFoundError, Runtime, RuntimeConfig, RuntimeError, RuntimeStats, TaskError,
};
pub use scope::Scope;
pub use service::{Service, ServiceCallback, ServiceRegistry};
pub use stagehand_types::{InstanceId, StateMap, TaskId, Value};
pub use sync::{Channel, ReentrantLock, ReentrantLockGuard};
