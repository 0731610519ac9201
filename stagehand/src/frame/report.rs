//! Aggregated hook failures from a frame load or unload cascade

use crate::actor::LifecycleHookKind;
use stagehand_types::InstanceId;
use std::fmt;

/// One hook that failed while a frame changed phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub actor: InstanceId,
    pub frame: String,
    pub phase: LifecycleHookKind,
    pub message: String,
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} in frame '{}': {}",
            self.phase, self.actor, self.frame, self.message
        )
    }
}

/// Outcome of [`Frame::load`](super::Frame::load) or
/// [`Frame::unload`](super::Frame::unload)
///
/// A failing hook never aborts the cascade; it is recorded here instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct LifecycleReport {
    pub failures: Vec<HookFailure>,
}

impl LifecycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Append another report's failures, e.g. from a child frame
    pub fn merge(&mut self, other: LifecycleReport) {
        self.failures.extend(other.failures);
    }

    pub(crate) fn record(
        &mut self,
        frame: &str,
        actor: &InstanceId,
        phase: LifecycleHookKind,
        message: String,
    ) {
        tracing::warn!(frame = %frame, actor = %actor, hook = %phase, error = %message, "lifecycle hook failed");
        self.failures.push(HookFailure {
            actor: actor.clone(),
            frame: frame.to_string(),
            phase,
            message,
        });
    }

    /// Failures recorded for one actor
    pub fn for_actor<'a>(&'a self, actor: &'a InstanceId) -> impl Iterator<Item = &'a HookFailure> {
        self.failures.iter().filter(move |f| &f.actor == actor)
    }
}
