//! Per-actor FIFO mailbox

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use stagehand_types::Value;
use std::time::Duration;

/// A request for the actor to run one of its methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Message {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Envelope {
    Deliver(Message),
    /// Stop sentinel tagged with the worker generation it targets
    Stop(u64),
}

pub(crate) struct Mailbox {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub(crate) fn post(&self, envelope: Envelope) {
        // The mailbox owns its receiver, so the channel never disconnects.
        let _ = self.tx.send(envelope);
    }

    /// Wait up to `timeout` for the next envelope
    pub(crate) fn next(&self, timeout: Duration) -> Option<Envelope> {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => Some(envelope),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}
