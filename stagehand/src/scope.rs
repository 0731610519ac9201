//! Named channels and mutexes owned by an actor or a frame
//!
//! Script code refers to channels and mutexes by name. The first access
//! creates the primitive; later accesses from any thread share it.

use crate::sync::{Channel, ReentrantLock};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Scope {
    channels: Mutex<HashMap<String, Channel>>,
    mutexes: Mutex<HashMap<String, ReentrantLock>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the named channel, creating it with `capacity` on first access
    ///
    /// The capacity of an existing channel is never changed.
    pub fn channel(&self, name: &str, capacity: usize) -> Channel {
        self.channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Channel::new(capacity))
            .clone()
    }

    /// Get the named mutex, creating it on first access
    pub fn mutex(&self, name: &str) -> ReentrantLock {
        self.mutexes
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }

    /// Close and forget every channel in the scope
    ///
    /// Blocked receivers wake up; the next access by name creates a fresh
    /// channel. Returns how many channels were closed.
    pub fn close_channels(&self) -> usize {
        let channels: Vec<Channel> = self.channels.lock().drain().map(|(_, ch)| ch).collect();
        for channel in &channels {
            channel.close();
        }
        channels.len()
    }
}
