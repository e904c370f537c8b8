//! Interaction acknowledgement promise.
//!
//! The upstream service announces the id of an accepted command on a side
//! channel, some time after the HTTP call returned. The dispatcher registers
//! one pending expectation before sending; the event intake completes it
//! exactly once. Only one command is in flight per worker, so a single slot
//! is enough.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::task::TaskId;

#[derive(Debug)]
struct PendingInteraction {
    command_name: String,
    task_id: TaskId,
    tx: oneshot::Sender<String>,
}

#[derive(Debug, Default)]
pub struct InteractionWaiter {
    pending: Mutex<Option<PendingInteraction>>,
}

impl InteractionWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect an announcement for `command_name` on behalf of `task_id`.
    ///
    /// Replaces any stale expectation; its receiver observes a closed channel.
    pub fn expect(&self, command_name: &str, task_id: TaskId) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let previous = self.pending.lock().replace(PendingInteraction {
            command_name: command_name.to_string(),
            task_id,
            tx,
        });
        if let Some(stale) = previous {
            warn!(
                task_id = %stale.task_id,
                command = %stale.command_name,
                "Replacing unacknowledged interaction expectation"
            );
        }
        rx
    }

    /// Complete the pending expectation if the command name matches.
    ///
    /// Returns the task the interaction belongs to.
    pub fn announce(&self, interaction_id: &str, command_name: &str) -> Option<TaskId> {
        let mut pending = self.pending.lock();
        let matches = pending
            .as_ref()
            .is_some_and(|p| p.command_name == command_name);
        if !matches {
            debug!(
                interaction_id = %interaction_id,
                command = %command_name,
                "Interaction announcement with no matching expectation"
            );
            return None;
        }

        let expectation = pending.take()?;
        // The dispatcher may have stopped waiting; binding still applies
        let _ = expectation.tx.send(interaction_id.to_string());
        Some(expectation.task_id)
    }

    /// Drop the pending expectation if it still belongs to `task_id`
    pub fn clear(&self, task_id: &TaskId) {
        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|p| &p.task_id == task_id) {
            pending.take();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}
