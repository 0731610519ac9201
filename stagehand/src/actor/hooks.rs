//! Evaluator-supplied hooks and method bodies
//!
//! The evaluator compiles script lifecycle methods and method bodies into
//! these callables when it constructs an actor. Every callable receives the
//! actor it runs on, so a hook may read and write that actor's state.

use super::Actor;
use crate::hook::HookResult;
use stagehand_types::{StateMap, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `on_mount`, `on_unmount` and the frame lifecycle hooks
pub type LifecycleHook = Arc<dyn Fn(&Actor) -> HookResult + Send + Sync>;

/// `on_update(old_state)`
pub type UpdateHook = Arc<dyn Fn(&Actor, &StateMap) -> HookResult + Send + Sync>;

/// `on_error(err)`
pub type ErrorHook = Arc<dyn Fn(&Actor, &anyhow::Error) -> HookResult + Send + Sync>;

/// A compiled method body: `(actor, args) -> value`
pub type Method = Arc<dyn Fn(&Actor, Vec<Value>) -> HookResult<Value> + Send + Sync>;

/// Lifecycle points at which an actor may run a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHookKind {
    Mount,
    Unmount,
    FrameWillLoad,
    FrameDidLoad,
    FrameWillUnload,
    FrameDidUnload,
}

impl LifecycleHookKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mount => "on_mount",
            Self::Unmount => "on_unmount",
            Self::FrameWillLoad => "frame_will_load",
            Self::FrameDidLoad => "frame_did_load",
            Self::FrameWillUnload => "frame_will_unload",
            Self::FrameDidUnload => "frame_did_unload",
        }
    }
}

impl fmt::Display for LifecycleHookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The optional hooks of one actor
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) lifecycle: HashMap<LifecycleHookKind, LifecycleHook>,
    pub(crate) on_update: Option<UpdateHook>,
    pub(crate) on_error: Option<ErrorHook>,
}

impl Hooks {
    pub fn has(&self, kind: LifecycleHookKind) -> bool {
        self.lifecycle.contains_key(&kind)
    }

    pub(crate) fn get(&self, kind: LifecycleHookKind) -> Option<LifecycleHook> {
        self.lifecycle.get(&kind).cloned()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.lifecycle.keys().map(|k| k.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("Hooks")
            .field("lifecycle", &kinds)
            .field("on_update", &self.on_update.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
