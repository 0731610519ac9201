//! Body of a parallel actor's dedicated thread

use super::mailbox::Envelope;
use super::Actor;
use crate::runtime::ActorError;
use std::sync::atomic::Ordering;

/// Mount, run the entry method, then serve the mailbox until stopped
pub(super) fn run(actor: Actor, generation: u64) {
    let id = actor.id().clone();
    tracing::debug!(actor = %id, generation, "worker running");

    if let Err(err) = actor.mount() {
        tracing::error!(actor = %id, error = %err, "mount failed on worker");
        finish(&actor, generation);
        return;
    }

    if let Some(entry) = actor.entry_method().map(str::to_string) {
        if let Err(err) = actor.invoke(&entry, Vec::new()) {
            tracing::error!(actor = %id, method = %entry, error = %err, "entry method failed");
            finish(&actor, generation);
            return;
        }
    }

    while actor.is_running() && actor.is_current_generation(generation) {
        match actor.next_envelope() {
            Some(Envelope::Stop(target)) if target == generation => break,
            Some(Envelope::Stop(_)) => continue,
            Some(Envelope::Deliver(message)) => match actor.invoke(&message.method, message.args) {
                Ok(_) => {}
                Err(err @ ActorError::MethodNotFound { .. }) => {
                    tracing::warn!(actor = %id, error = %err, "dropping message");
                }
                Err(err) => {
                    tracing::error!(actor = %id, method = %message.method, error = %err, "worker stopping after failure");
                    break;
                }
            },
            None => {
                tracing::trace!(
                    actor = %id,
                    poll_ms = actor.poll_interval().as_millis() as u64,
                    "mailbox idle"
                );
            }
        }
    }

    finish(&actor, generation);
}

fn finish(actor: &Actor, generation: u64) {
    // A newer worker owns the running flag once the generation moves on.
    if actor.is_current_generation(generation) {
        actor.inner.running.store(false, Ordering::SeqCst);
    }
    tracing::debug!(actor = %actor.id(), generation, "worker exited");
}
