//! Blocking primitives handed to script code
//!
//! - `Channel`: FIFO value queue, bounded or unbounded
//! - `ReentrantLock`: the script-level `Mutex()`

mod channel;
mod mutex;

pub use channel::Channel;
pub use mutex::{ReentrantLock, ReentrantLockGuard};
