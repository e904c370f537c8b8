//! # Task Runtime
//!
//! One runtime per caller-visible task. The runtime owns its result channel and
//! the per-index waiters of manual upscales; both are single-resolution. A
//! second delivery attempt is detected and reported as `false`, never a panic.

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{TaskEvent, TaskId, TaskKind, TaskResult, TaskState};
use crate::correlation::hashing::KeywordHash;
use crate::error::{BridgeError, Result};

pub type ResultReceiver = oneshot::Receiver<TaskResult>;

/// Outcome of recording one derived artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactProgress {
    /// Same message already counted (at-least-once redelivery)
    Duplicate,
    /// Every expected slot was already settled
    Overflow,
    Accepted { settled: u8, expected: u8 },
}

/// What a completed generate task leaves behind so it can still be upscaled
#[derive(Debug, Clone)]
pub struct OriginAnchor {
    pub task_id: TaskId,
    pub origin_message_id: String,
    pub origin_artifact_id: Option<String>,
    pub origin_artifact_url: String,
    pub retained_at: Instant,
}

#[derive(Debug)]
pub struct TaskRuntime {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub keyword_hash: Option<KeywordHash>,
    pub interaction_id: Option<String>,
    pub origin_message_id: Option<String>,
    pub origin_artifact_url: Option<String>,
    pub origin_artifact_id: Option<String>,
    pub auto_upscale: bool,
    pub expected_count: u8,
    pub started: Instant,
    accumulated_artifacts: Vec<String>,
    failed_slots: u8,
    seen_messages: HashSet<String>,
    index_waiters: HashMap<u8, oneshot::Sender<TaskResult>>,
    result_tx: Option<oneshot::Sender<TaskResult>>,
}

impl TaskRuntime {
    /// Create a runtime for a new whole-task request
    pub fn new(
        task_id: TaskId,
        kind: TaskKind,
        auto_upscale: bool,
        expected_count: u8,
    ) -> (Self, ResultReceiver) {
        let (tx, rx) = oneshot::channel();
        let runtime = Self {
            task_id,
            kind,
            state: TaskState::Created,
            keyword_hash: None,
            interaction_id: None,
            origin_message_id: None,
            origin_artifact_url: None,
            origin_artifact_id: None,
            auto_upscale,
            expected_count,
            started: Instant::now(),
            accumulated_artifacts: Vec::new(),
            failed_slots: 0,
            seen_messages: HashSet::new(),
            index_waiters: HashMap::new(),
            result_tx: Some(tx),
        };
        (runtime, rx)
    }

    /// Re-open a completed generate task for per-index upscales
    pub fn reopen_for_manual_upscale(anchor: &OriginAnchor) -> Self {
        Self {
            task_id: anchor.task_id.clone(),
            kind: TaskKind::Generate,
            state: TaskState::ManualUpscaling,
            keyword_hash: None,
            interaction_id: None,
            origin_message_id: Some(anchor.origin_message_id.clone()),
            origin_artifact_url: Some(anchor.origin_artifact_url.clone()),
            origin_artifact_id: anchor.origin_artifact_id.clone(),
            auto_upscale: false,
            expected_count: 0,
            started: Instant::now(),
            accumulated_artifacts: Vec::new(),
            failed_slots: 0,
            seen_messages: HashSet::new(),
            index_waiters: HashMap::new(),
            result_tx: None,
        }
    }

    /// Apply a state machine event
    pub fn transition(&mut self, event: &TaskEvent) -> Result<TaskState> {
        let target = self
            .state
            .on_event(event)
            .ok_or_else(|| BridgeError::InvalidTaskState {
                task_id: self.task_id.to_string(),
                state: self.state.to_string(),
                reason: format!("no transition for {event:?}"),
            })?;
        debug!(
            task_id = %self.task_id,
            from = %self.state,
            to = %target,
            "Task state transition"
        );
        self.state = target;
        Ok(target)
    }

    /// Deliver the whole-task result.
    ///
    /// Returns `false` if a result was already delivered or the caller stopped
    /// waiting.
    pub fn deliver(&mut self, result: TaskResult) -> bool {
        let Some(tx) = self.result_tx.take() else {
            warn!(task_id = %self.task_id, "Duplicate resolution dropped");
            return false;
        };
        if tx.send(result).is_err() {
            debug!(task_id = %self.task_id, "Caller no longer waiting for result");
            return false;
        }
        true
    }

    /// Register an independent waiter for one upscale index
    pub fn add_index_waiter(&mut self, index: u8) -> Result<ResultReceiver> {
        if self
            .index_waiters
            .get(&index)
            .is_some_and(|tx| !tx.is_closed())
        {
            return Err(BridgeError::InvalidTaskState {
                task_id: self.task_id.to_string(),
                state: self.state.to_string(),
                reason: format!("upscale of index {index} already pending"),
            });
        }
        let (tx, rx) = oneshot::channel();
        self.index_waiters.insert(index, tx);
        Ok(rx)
    }

    /// Resolve the waiter of one index; `false` if there is none
    pub fn resolve_index(&mut self, index: u8, result: TaskResult) -> bool {
        match self.index_waiters.remove(&index) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    pub fn fail_all_waiters(&mut self, message: &str) -> usize {
        let waiters: Vec<_> = self.index_waiters.drain().collect();
        let count = waiters.len();
        for (_, tx) in waiters {
            let _ = tx.send(TaskResult::failure(self.task_id.clone(), message));
        }
        count
    }

    pub fn has_index_waiters(&self) -> bool {
        self.index_waiters.values().any(|tx| !tx.is_closed())
    }

    /// Record a derived artifact in auto-upscale mode
    pub fn record_artifact(&mut self, message_id: &str, url: &str) -> ArtifactProgress {
        if self.seen_messages.contains(message_id) {
            return ArtifactProgress::Duplicate;
        }
        if self.settled_slots() >= self.expected_count {
            return ArtifactProgress::Overflow;
        }
        self.seen_messages.insert(message_id.to_string());
        self.accumulated_artifacts.push(url.to_string());
        ArtifactProgress::Accepted {
            settled: self.settled_slots(),
            expected: self.expected_count,
        }
    }

    /// Count an upscale slot whose command never reached the upstream service
    pub fn record_failed_slot(&mut self) -> u8 {
        if self.settled_slots() < self.expected_count {
            self.failed_slots += 1;
        }
        self.settled_slots()
    }

    pub fn settled_slots(&self) -> u8 {
        self.accumulated_artifacts.len() as u8 + self.failed_slots
    }

    pub fn all_slots_settled(&self) -> bool {
        self.settled_slots() >= self.expected_count
    }

    pub fn artifacts(&self) -> &[String] {
        &self.accumulated_artifacts
    }

    pub fn take_artifacts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.accumulated_artifacts)
    }

    /// Anchor kept after completion, if the origin was ever bound
    pub fn anchor(&self) -> Option<OriginAnchor> {
        Some(OriginAnchor {
            task_id: self.task_id.clone(),
            origin_message_id: self.origin_message_id.clone()?,
            origin_artifact_id: self.origin_artifact_id.clone(),
            origin_artifact_url: self.origin_artifact_url.clone()?,
            retained_at: Instant::now(),
        })
    }
}
