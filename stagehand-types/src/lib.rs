//! Shared types for stagehand
//!
//! Identity and value types used by the component runtime and by the
//! evaluator that drives it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Dynamic script value
///
/// Values compare by deep equality, which is what change detection in
/// services, contexts and actor state relies on.
pub type Value = serde_json::Value;

/// Named state of a component or service
pub type StateMap = HashMap<String, Value>;

/// Identity of a component instance, listener, subscriber or provider
///
/// Identities are plain names. Two registrations made under the same
/// identity are treated as the same owner (e.g. `off` removes both).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Create an identity with a caller-chosen name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Mint a fresh, globally unique identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for InstanceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Identifier of a task submitted to a frame's worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

static TASK_COUNTER: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocate the next task ID
    pub fn next() -> Self {
        Self(TASK_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}
