//! FIFO value channel shared between actors
//!
//! A channel is either bounded (`capacity > 0`, senders block while full) or
//! unbounded (`capacity == 0`). Closing a channel fails later sends but lets
//! receivers drain whatever is still queued before they observe closure.

use crate::runtime::ChannelError;
use parking_lot::{Condvar, Mutex};
use stagehand_types::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Queue {
    items: VecDeque<Value>,
    closed: bool,
}

struct ChannelInner {
    capacity: usize,
    queue: Mutex<Queue>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl ChannelInner {
    fn has_room(&self, queue: &Queue) -> bool {
        self.capacity == 0 || queue.items.len() < self.capacity
    }
}

/// A cloneable handle to a shared FIFO queue of values
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a channel; a capacity of 0 means unbounded
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                capacity,
                queue: Mutex::new(Queue {
                    items: VecDeque::new(),
                    closed: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Enqueue a value, blocking while a bounded channel is full
    ///
    /// Fails with [`ChannelError::Closed`] if the channel is closed before or
    /// while waiting for room.
    pub fn send(&self, value: Value) -> Result<(), ChannelError> {
        let mut queue = self.inner.queue.lock();
        loop {
            if queue.closed {
                return Err(ChannelError::Closed);
            }
            if self.inner.has_room(&queue) {
                queue.items.push_back(value);
                self.inner.not_empty.notify_one();
                return Ok(());
            }
            self.inner.not_full.wait(&mut queue);
        }
    }

    /// Enqueue without blocking
    pub fn try_send(&self, value: Value) -> Result<(), ChannelError> {
        let mut queue = self.inner.queue.lock();
        if queue.closed {
            return Err(ChannelError::Closed);
        }
        if !self.inner.has_room(&queue) {
            return Err(ChannelError::Full);
        }
        queue.items.push_back(value);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Take the next value in FIFO order
    ///
    /// Returns `None` once the channel is closed and drained, or when
    /// `timeout` elapses first. A `timeout` of `None` waits indefinitely for
    /// a value or for closure.
    pub fn receive(&self, timeout: Option<Duration>) -> Option<Value> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.inner.queue.lock();
        loop {
            if let Some(value) = queue.items.pop_front() {
                self.inner.not_full.notify_one();
                return Some(value);
            }
            if queue.closed {
                return None;
            }
            match deadline {
                None => self.inner.not_empty.wait(&mut queue),
                Some(deadline) => {
                    if self
                        .inner
                        .not_empty
                        .wait_until(&mut queue, deadline)
                        .timed_out()
                    {
                        let value = queue.items.pop_front();
                        if value.is_some() {
                            self.inner.not_full.notify_one();
                        }
                        return value;
                    }
                }
            }
        }
    }

    /// Take the next value if one is queued
    pub fn try_receive(&self) -> Option<Value> {
        let mut queue = self.inner.queue.lock();
        let value = queue.items.pop_front();
        if value.is_some() {
            self.inner.not_full.notify_one();
        }
        value
    }

    /// Close the channel; idempotent
    pub fn close(&self) {
        let mut queue = self.inner.queue.lock();
        if queue.closed {
            return;
        }
        queue.closed = true;
        tracing::debug!(pending = queue.items.len(), "channel closed");
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.queue.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.inner.queue.lock();
        f.debug_struct("Channel")
            .field("capacity", &self.inner.capacity)
            .field("len", &queue.items.len())
            .field("closed", &queue.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let ch = Channel::unbounded();
        for i in 0..5 {
            ch.send(json!(i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(ch.receive(Some(Duration::ZERO)), Some(json!(i)));
        }
        assert!(ch.is_empty());
    }

    #[test]
    fn test_receive_times_out() {
        let ch = Channel::new(1);
        let start = Instant::now();
        assert_eq!(ch.receive(Some(Duration::from_millis(30))), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_send_after_close_fails() {
        let ch = Channel::unbounded();
        ch.close();
        ch.close();
        assert_eq!(ch.send(json!("late")), Err(ChannelError::Closed));
        assert!(ch.is_closed());
    }

    #[test]
    fn test_close_drains_before_reporting() {
        let ch = Channel::unbounded();
        ch.send(json!("a")).unwrap();
        ch.send(json!("b")).unwrap();
        ch.close();

        assert_eq!(ch.receive(None), Some(json!("a")));
        assert_eq!(ch.receive(None), Some(json!("b")));
        assert_eq!(ch.receive(None), None);
    }

    #[test]
    fn test_try_send_on_full() {
        let ch = Channel::new(1);
        ch.try_send(json!(1)).unwrap();
        assert_eq!(ch.try_send(json!(2)), Err(ChannelError::Full));
        assert_eq!(ch.try_receive(), Some(json!(1)));
        assert_eq!(ch.try_receive(), None);
    }

    #[test]
    fn test_bounded_send_blocks_until_drained() {
        let ch = Channel::new(1);
        ch.send(json!("a")).unwrap();

        let sender = ch.clone();
        let handle = thread::spawn(move || sender.send(json!("b")));

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        assert_eq!(ch.len(), 1);

        assert_eq!(ch.receive(Some(Duration::from_secs(1))), Some(json!("a")));
        handle.join().unwrap().unwrap();
        assert_eq!(ch.receive(Some(Duration::from_secs(1))), Some(json!("b")));
    }

    #[test]
    fn test_close_wakes_blocked_sender() {
        let ch = Channel::new(1);
        ch.send(json!(1)).unwrap();

        let sender = ch.clone();
        let handle = thread::spawn(move || sender.send(json!(2)));

        thread::sleep(Duration::from_millis(20));
        ch.close();
        assert_eq!(handle.join().unwrap(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_receiver() {
        let ch = Channel::unbounded();
        let receiver = ch.clone();
        let handle = thread::spawn(move || receiver.receive(None));

        thread::sleep(Duration::from_millis(20));
        ch.close();
        assert_eq!(handle.join().unwrap(), None);
    }
}
