//! Guarded execution of evaluator-supplied callbacks
//!
//! Hooks, method bodies and subscriber callbacks come from script code and
//! may fail or panic. Everything that crosses into user code goes through
//! [`guarded`], which turns a panic into an ordinary error so that the
//! caller's recovery policy (log and continue, `on_error`, propagate) applies
//! uniformly.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result type returned by hooks, methods and callbacks
pub type HookResult<T = ()> = anyhow::Result<T>;

/// Run `f`, converting a panic into an error
pub fn guarded<T>(f: impl FnOnce() -> HookResult<T>) -> HookResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))),
    }
}

/// Run a subscriber-style callback whose failure must not reach the caller
///
/// Returns `true` if the callback completed successfully.
pub(crate) fn isolated(what: &str, f: impl FnOnce() -> HookResult) -> bool {
    match guarded(f) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(callback = what, error = %format!("{err:#}"), "callback failed");
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
