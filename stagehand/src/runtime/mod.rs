//! Runtime coordinator for stagehand components
//!
//! The runtime owns the process-level instances the evaluator threads
//! through a program:
//! - the global event bus
//! - the global service and context registries
//! - the frame registry
//! - the component parent relation used for context resolution

mod config;
mod error;

pub use config::{ConfigError, DuplicateFramePolicy, RuntimeConfig};
pub use error::{
    ActorError, ActorResult, ChannelError, FrameError, LockError, NotFoundError, Result,
    RuntimeError, TaskError,
};

use crate::actor::{Actor, ActorBuilder};
use crate::bus::EventBus;
use crate::context::{ContextRegistry, Lineage};
use crate::frame::{Frame, FrameRegistry, LifecycleReport};
use crate::service::ServiceRegistry;
use stagehand_types::InstanceId;
use std::sync::Arc;

/// The main runtime coordinator
///
/// # Example
///
/// ```
/// use stagehand::Runtime;
/// use serde_json::json;
///
/// let runtime = Runtime::with_defaults();
/// runtime.create_frame("root", None).unwrap();
///
/// let counter = runtime
///     .actor("c1")
///     .on_mount(|actor| {
///         actor.set_state("mounted", json!(true))?;
///         Ok(())
///     })
///     .build();
/// runtime.add_component("root", "c1", counter.clone()).unwrap();
///
/// assert!(runtime.load_frame("root").unwrap().is_clean());
/// assert_eq!(counter.get_state("mounted"), Some(json!(true)));
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    lineage: Arc<Lineage>,
    events: Arc<EventBus>,
    services: Arc<ServiceRegistry>,
    contexts: Arc<ContextRegistry>,
    frames: FrameRegistry,
}

impl Runtime {
    /// Create a new runtime with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RuntimeConfig::default())
    }

    /// Create a new runtime with the given configuration
    pub fn new(config: RuntimeConfig) -> Self {
        let lineage = Arc::new(Lineage::new());
        Self {
            events: Arc::new(EventBus::new()),
            services: Arc::new(ServiceRegistry::new()),
            contexts: Arc::new(ContextRegistry::new(lineage.clone())),
            frames: FrameRegistry::new(config.clone(), lineage.clone()),
            lineage,
            config,
        }
    }

    /// Load the configuration from a YAML file and build a runtime from it
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(RuntimeConfig::from_file(path)?))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The global event bus
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    pub fn frames(&self) -> &FrameRegistry {
        &self.frames
    }

    /// Component parent relation shared by every context registry
    pub fn lineage(&self) -> &Arc<Lineage> {
        &self.lineage
    }

    /// Record that component `child` was instantiated beneath `parent`
    pub fn set_parent(&self, child: impl Into<InstanceId>, parent: impl Into<InstanceId>) {
        self.lineage.set_parent(child.into(), parent.into());
    }

    /// Start building an actor with this runtime's timing configuration
    pub fn actor(&self, id: impl Into<InstanceId>) -> ActorBuilder {
        Actor::builder(id).with_config(&self.config)
    }

    pub fn create_frame(&self, name: &str, parent: Option<&str>) -> Result<Frame> {
        Ok(self.frames.create_frame(name, parent)?)
    }

    pub fn get_frame(&self, name: &str) -> Option<Frame> {
        self.frames.get_frame(name)
    }

    pub fn load_frame(&self, name: &str) -> Result<LifecycleReport> {
        Ok(self.frames.load_frame(name)?)
    }

    pub fn unload_frame(&self, name: &str) -> Result<LifecycleReport> {
        Ok(self.frames.unload_frame(name)?)
    }

    pub fn remove_frame(&self, name: &str) -> Result<LifecycleReport> {
        Ok(self.frames.remove_frame(name)?)
    }

    pub fn add_component(&self, frame: &str, id: &str, actor: Actor) -> Result<()> {
        self.frames.add_component(frame, id, actor)
    }

    /// Unload every frame
    pub fn shutdown(&self) -> LifecycleReport {
        tracing::info!(frames = self.frames.len(), "runtime shutting down");
        let report = self.frames.unload_all();
        if !report.is_clean() {
            tracing::warn!(failures = report.failures.len(), "shutdown finished with hook failures");
        }
        report
    }

    /// Get statistics about the runtime
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            frame_count: self.frames.len(),
            loaded_frames: self.frames.loaded_count(),
            service_count: self.services.len(),
            context_count: self.contexts.len(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("frames", &self.frames)
            .finish()
    }
}

/// Statistics about the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Number of registered frames
    pub frame_count: usize,
    /// Frames currently loaded
    pub loaded_frames: usize,
    /// Number of global services
    pub service_count: usize,
    /// Number of global contexts
    pub context_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Service;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_runtime_creation() {
        let runtime = Runtime::with_defaults();
        assert_eq!(
            runtime.stats(),
            RuntimeStats {
                frame_count: 0,
                loaded_frames: 0,
                service_count: 0,
                context_count: 0,
            }
        );
    }

    #[test]
    fn test_actor_builder_uses_config() {
        let config = RuntimeConfig {
            mailbox_poll_interval_ms: 5,
            ..RuntimeConfig::default()
        };
        let runtime = Runtime::new(config);
        let actor = runtime
            .actor("p")
            .parallel(true)
            .method("ping", |_, _| Ok(json!("pong")))
            .build();

        actor.start().unwrap();
        assert!(actor.is_running());
        actor.stop().unwrap();
        assert!(actor.receive(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn test_global_registries_are_shared() {
        let runtime = Runtime::with_defaults();
        runtime.services().register(Arc::new(Service::new("settings")));
        runtime.contexts().create("theme", json!("light"));

        let stats = runtime.stats();
        assert_eq!(stats.service_count, 1);
        assert_eq!(stats.context_count, 1);
    }

    #[test]
    fn test_lineage_feeds_global_contexts() {
        let runtime = Runtime::with_defaults();
        runtime.set_parent("child", "parent");
        let theme = runtime.contexts().create("theme", json!("light"));
        theme.provide(InstanceId::new("parent"), json!("dark"));
        assert_eq!(theme.resolve(&InstanceId::new("child")), json!("dark"));
    }

    #[test]
    fn test_frame_calls_and_shutdown() {
        let runtime = Runtime::with_defaults();
        runtime.create_frame("root", None).unwrap();
        runtime.create_frame("panel", Some("root")).unwrap();
        let _ = runtime.load_frame("root").unwrap();
        let _ = runtime.load_frame("panel").unwrap();
        assert_eq!(runtime.stats().loaded_frames, 2);

        assert!(matches!(
            runtime.load_frame("missing"),
            Err(RuntimeError::Frame(FrameError::NotFound(_)))
        ));
        assert!(matches!(
            runtime.add_component("missing", "c", runtime.actor("c").build()),
            Err(RuntimeError::Frame(FrameError::NotFound(_)))
        ));

        assert!(runtime.shutdown().is_clean());
        assert_eq!(runtime.stats().loaded_frames, 0);
        assert_eq!(runtime.stats().frame_count, 2);
    }
}
