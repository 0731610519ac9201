//! Name-keyed table of frames

use super::{Frame, LifecycleReport};
use crate::actor::Actor;
use crate::context::Ancestry;
use crate::runtime::{DuplicateFramePolicy, FrameError, NotFoundError, RuntimeConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of every frame, looked up by name
///
/// Frame names are unique. What happens when a name is reused is governed
/// by [`DuplicateFramePolicy`].
pub struct FrameRegistry {
    frames: Mutex<HashMap<String, Frame>>,
    config: RuntimeConfig,
    ancestry: Arc<dyn Ancestry>,
}

impl FrameRegistry {
    pub fn new(config: RuntimeConfig, ancestry: Arc<dyn Ancestry>) -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
            config,
            ancestry,
        }
    }

    /// Create a frame and link it under `parent`
    ///
    /// An unknown parent name leaves the frame unparented. The duplicate
    /// check and the insert happen under one lock, so concurrent creates of
    /// the same name obey the policy.
    pub fn create_frame(&self, name: &str, parent: Option<&str>) -> Result<Frame, FrameError> {
        let frame = Frame::new(name, &self.config, self.ancestry.clone());
        let (replaced, parent_frame) = {
            let mut frames = self.frames.lock();
            if frames.contains_key(name) && self.config.duplicate_frames == DuplicateFramePolicy::Reject {
                return Err(FrameError::DuplicateFrame(name.to_string()));
            }
            let replaced = frames.insert(name.to_string(), frame.clone());
            let parent_frame = parent.and_then(|p| frames.get(p).cloned());
            (replaced, parent_frame)
        };

        if let Some(old) = replaced {
            tracing::info!(frame = %name, "replacing existing frame");
            let report = old.dispose();
            if !report.is_clean() {
                tracing::warn!(frame = %name, failures = report.failures.len(), "replaced frame unloaded with failures");
            }
        }

        match (parent, parent_frame) {
            (Some(_), Some(parent_frame)) => parent_frame.add_child(&frame),
            (Some(parent_name), None) => {
                tracing::warn!(frame = %name, parent = %parent_name, "parent frame not found; creating unparented");
            }
            (None, _) => {}
        }
        tracing::debug!(frame = %name, parent = ?parent, "frame created");
        Ok(frame)
    }

    pub fn get_frame(&self, name: &str) -> Option<Frame> {
        self.frames.lock().get(name).cloned()
    }

    /// Look up `name`, failing with [`NotFoundError::Frame`]
    pub fn require(&self, name: &str) -> Result<Frame, NotFoundError> {
        self.get_frame(name)
            .ok_or_else(|| NotFoundError::Frame(name.to_string()))
    }

    /// Unload the named frame, detach it and forget it
    pub fn remove_frame(&self, name: &str) -> Result<LifecycleReport, FrameError> {
        let frame = self.require(name)?;
        let report = frame.dispose();
        let mut frames = self.frames.lock();
        if frames.get(name).is_some_and(|current| current.ptr_eq(&frame)) {
            frames.remove(name);
        }
        Ok(report)
    }

    pub fn load_frame(&self, name: &str) -> Result<LifecycleReport, FrameError> {
        Ok(self.require(name)?.load())
    }

    pub fn unload_frame(&self, name: &str) -> Result<LifecycleReport, FrameError> {
        Ok(self.require(name)?.unload())
    }

    /// Register `actor` as component `id` of the named frame
    ///
    /// An unknown frame fails with [`FrameError::NotFound`], like the other
    /// frame operations.
    pub fn add_component(
        &self,
        frame: &str,
        id: &str,
        actor: Actor,
    ) -> crate::runtime::Result<()> {
        let frame = self.require(frame).map_err(FrameError::from)?;
        frame.add_component(id, actor)?;
        Ok(())
    }

    /// Unload every frame; child frames unload with their parents
    pub fn unload_all(&self) -> LifecycleReport {
        let mut frames: Vec<Frame> = self.frames.lock().values().cloned().collect();
        // Roots first so children are reached through the cascade.
        frames.sort_by_key(|f| f.parent().is_some());
        let mut report = LifecycleReport::default();
        for frame in frames {
            report.merge(frame.unload());
        }
        report
    }

    pub fn names(&self) -> Vec<String> {
        self.frames.lock().keys().cloned().collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.frames.lock().values().filter(|f| f.is_loaded()).count()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRegistry")
            .field("frames", &self.names())
            .field("duplicate_frames", &self.config.duplicate_frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Lineage;
    use crate::runtime::RuntimeError;

    fn registry(policy: DuplicateFramePolicy) -> FrameRegistry {
        let config = RuntimeConfig {
            duplicate_frames: policy,
            ..RuntimeConfig::default()
        };
        FrameRegistry::new(config, Arc::new(Lineage::new()))
    }

    #[test]
    fn test_create_links_parent() {
        let frames = registry(DuplicateFramePolicy::Replace);
        let root = frames.create_frame("root", None).unwrap();
        let child = frames.create_frame("child", Some("root")).unwrap();

        assert_eq!(child.parent_name().as_deref(), Some("root"));
        assert!(root.child("child").is_some());
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_missing_parent_leaves_frame_unparented() {
        let frames = registry(DuplicateFramePolicy::Replace);
        let orphan = frames.create_frame("orphan", Some("nowhere")).unwrap();
        assert!(orphan.parent().is_none());
        assert!(frames.get_frame("orphan").is_some());
    }

    #[test]
    fn test_replace_unloads_previous() {
        let frames = registry(DuplicateFramePolicy::Replace);
        let first = frames.create_frame("main", None).unwrap();
        let _ = first.load();

        let second = frames.create_frame("main", None).unwrap();
        assert!(!first.is_loaded());
        assert!(!first.ptr_eq(&second));
        assert!(frames.get_frame("main").unwrap().ptr_eq(&second));
    }

    #[test]
    fn test_reject_keeps_previous() {
        let frames = registry(DuplicateFramePolicy::Reject);
        let first = frames.create_frame("main", None).unwrap();
        assert_eq!(
            frames.create_frame("main", None).unwrap_err(),
            FrameError::DuplicateFrame("main".into())
        );
        assert!(frames.get_frame("main").unwrap().ptr_eq(&first));
    }

    #[test]
    fn test_replace_releases_never_loaded_frame() {
        let frames = registry(DuplicateFramePolicy::Replace);
        let root = frames.create_frame("root", None).unwrap();
        let first = frames.create_frame("main", Some("root")).unwrap();
        let _ = first.run_in_frame(|| 1).unwrap().join();

        let second = frames.create_frame("main", Some("root")).unwrap();
        let children: Vec<String> = root.children().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(children, vec!["main"]);
        assert!(root.child("main").unwrap().ptr_eq(&second));
        assert!(first.parent().is_none());
        assert!(first.pool().is_shut_down());
        assert_eq!(first.pool().thread_count(), 0);
    }

    #[test]
    fn test_remove_detaches_never_loaded_frame() {
        let frames = registry(DuplicateFramePolicy::Replace);
        let root = frames.create_frame("root", None).unwrap();
        let panel = frames.create_frame("panel", Some("root")).unwrap();

        assert!(frames.remove_frame("panel").unwrap().is_clean());
        assert!(frames.get_frame("panel").is_none());
        assert!(root.children().is_empty());
        assert!(panel.parent().is_none());
        assert!(panel.pool().is_shut_down());
    }

    #[test]
    fn test_concurrent_creates_respect_reject() {
        let frames = Arc::new(registry(DuplicateFramePolicy::Reject));
        for round in 0..50 {
            let name = format!("frame-{round}");
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let attempts: Vec<_> = (0..2)
                .map(|_| {
                    let frames = frames.clone();
                    let barrier = barrier.clone();
                    let name = name.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        frames.create_frame(&name, None).is_ok()
                    })
                })
                .collect();
            let created = attempts
                .into_iter()
                .map(|t| t.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(created, 1);
        }
        assert_eq!(frames.len(), 50);
    }

    #[test]
    fn test_unknown_frame_operations() {
        let frames = registry(DuplicateFramePolicy::Replace);
        assert!(matches!(
            frames.load_frame("ghost"),
            Err(FrameError::NotFound(NotFoundError::Frame(_)))
        ));
        assert!(frames.unload_frame("ghost").is_err());
        assert!(frames.remove_frame("ghost").is_err());
        assert!(matches!(
            frames.add_component("ghost", "c", Actor::builder("c").build()),
            Err(RuntimeError::Frame(FrameError::NotFound(NotFoundError::Frame(_))))
        ));
    }

    #[test]
    fn test_remove_unloads_and_forgets() {
        let frames = registry(DuplicateFramePolicy::Replace);
        let frame = frames.create_frame("temp", None).unwrap();
        let _ = frames.load_frame("temp").unwrap();

        assert!(frames.remove_frame("temp").unwrap().is_clean());
        assert!(!frame.is_loaded());
        assert!(frames.get_frame("temp").is_none());
    }

    #[test]
    fn test_unload_all() {
        let frames = registry(DuplicateFramePolicy::Replace);
        frames.create_frame("root", None).unwrap();
        frames.create_frame("leaf", Some("root")).unwrap();
        for name in ["root", "leaf"] {
            let _ = frames.load_frame(name).unwrap();
        }
        assert_eq!(frames.loaded_count(), 2);

        assert!(frames.unload_all().is_clean());
        assert_eq!(frames.loaded_count(), 0);
    }
}
