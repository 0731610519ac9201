//! Reentrant mutex exposed to script code
//!
//! Script code acquires and releases locks as separate statements, so the
//! lock cannot be a plain RAII guard. Ownership is tracked per thread with a
//! recursion depth; the same thread may acquire repeatedly and must release
//! as many times. [`ReentrantLock::lock`] and [`ReentrantLock::with`] give the
//! scoped form that releases on every exit path, unwinding included.

use crate::runtime::LockError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
struct LockInner {
    state: Mutex<Ownership>,
    released: Condvar,
}

/// A cloneable handle to a shared reentrant lock
#[derive(Debug, Clone, Default)]
pub struct ReentrantLock {
    inner: Arc<LockInner>,
}

impl ReentrantLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the calling thread owns the lock
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.inner.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => self.inner.released.wait(&mut state),
            }
        }
    }

    /// Acquire without blocking; returns whether the lock is now held
    pub fn try_acquire(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.inner.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                state.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Undo one `acquire` made by the calling thread
    pub fn release(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.inner.state.lock();
        if state.owner != Some(me) {
            return Err(LockError::NotOwner);
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.inner.released.notify_one();
        }
        Ok(())
    }

    /// Acquire and return a guard that releases on drop
    pub fn lock(&self) -> ReentrantLockGuard<'_> {
        self.acquire();
        ReentrantLockGuard { lock: self }
    }

    /// Run `f` while holding the lock
    pub fn with<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock();
        f()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.lock().owner.is_some()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.state.lock().owner == Some(thread::current().id())
    }
}

/// Scoped acquisition of a [`ReentrantLock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReentrantLockGuard<'a> {
    lock: &'a ReentrantLock,
}

impl Drop for ReentrantLockGuard<'_> {
    fn drop(&mut self) {
        // The guard's thread acquired the lock, so this cannot fail.
        let _ = self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_reentrant_acquire() {
        let lock = ReentrantLock::new();
        lock.acquire();
        lock.acquire();
        assert!(lock.is_held_by_current_thread());

        lock.release().unwrap();
        assert!(lock.is_locked());
        lock.release().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_release_without_owning() {
        let lock = ReentrantLock::new();
        assert_eq!(lock.release(), Err(LockError::NotOwner));

        lock.acquire();
        let other = lock.clone();
        let result = thread::spawn(move || other.release()).join().unwrap();
        assert_eq!(result, Err(LockError::NotOwner));
        lock.release().unwrap();
    }

    #[test]
    fn test_other_thread_blocks() {
        let lock = ReentrantLock::new();
        lock.acquire();

        let other = lock.clone();
        let handle = thread::spawn(move || other.try_acquire());
        assert!(!handle.join().unwrap());

        let other = lock.clone();
        let handle = thread::spawn(move || {
            other.acquire();
            other.release().unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        lock.release().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let lock = ReentrantLock::new();
        let inner = lock.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            inner.with(|| panic!("inside guarded region"));
        }));
        assert!(result.is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = ReentrantLock::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        lock.with(|| {
                            // Non-atomic read-modify-write made safe by the lock
                            let v = counter.load(Ordering::Relaxed);
                            thread::yield_now();
                            counter.store(v + 1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 800);
    }
}
