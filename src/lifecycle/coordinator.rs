//! # Lifecycle Coordinator
//!
//! Owns one worker's task registry and drives every task through its state
//! machine. All registry mutation happens under a single per-worker lock that
//! is never held across an await point or a network call; commands produced
//! while the lock is held are returned to the caller for enqueueing.
//!
//! ## Resolution
//!
//! A task leaves the registry in the same critical section in which its
//! result is delivered. Any later event for its former keys misses the lookup
//! and is dropped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::interaction::InteractionWaiter;
use crate::config::{BridgeConfig, UnknownFailurePolicy, WorkerConfig};
use crate::constants::{system, wire};
use crate::correlation::hashing::submission_hash;
use crate::correlation::{CorrelationIndex, CorrelationKey};
use crate::dispatch::command::{Command, UpscaleOrigin};
use crate::error::{BridgeError, Result};
use crate::events::Classification;
use crate::logging::log_task_operation;
use crate::task::{
    ArtifactProgress, OriginAnchor, ResultReceiver, TaskEvent, TaskId, TaskKind, TaskResult,
    TaskRuntime, TaskState,
};

/// Everything needed to admit a generate task
#[derive(Debug, Clone)]
pub struct GenerateSubmission {
    pub task_id: TaskId,
    /// Prompt exactly as it will be sent, seed included
    pub canonical_prompt: String,
    pub seed: u32,
    pub fast_mode: bool,
    pub auto_upscale: bool,
    pub expected_count: u8,
}

/// Describe task admission
#[derive(Debug, Clone)]
pub struct DescribeSubmission {
    pub task_id: TaskId,
    pub filename: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

/// What one reaper pass removed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    pub expired_tasks: Vec<TaskId>,
    pub dropped_anchors: Vec<TaskId>,
}

#[derive(Debug, Default)]
struct Registry {
    index: CorrelationIndex,
    anchors: HashMap<TaskId, OriginAnchor>,
    recent: RecentMessages,
}

/// Bounded window of origin and failure message ids already applied
#[derive(Debug)]
struct RecentMessages {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl Default for RecentMessages {
    fn default() -> Self {
        Self::with_capacity(system::RECENT_MESSAGE_CAPACITY)
    }
}

impl RecentMessages {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Remember a message id. Returns `false` if it was already seen.
    fn record(&mut self, message_id: &str) -> bool {
        if message_id.is_empty() {
            return true;
        }
        if self.seen.contains(message_id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(message_id.to_string());
        self.seen.insert(message_id.to_string());
        true
    }
}

#[derive(Debug)]
pub struct LifecycleCoordinator {
    worker_id: String,
    variant_count: u8,
    max_unfinished_tasks: usize,
    unknown_failure_policy: UnknownFailurePolicy,
    task_ttl: Duration,
    origin_retention: Duration,
    registry: Mutex<Registry>,
    interactions: InteractionWaiter,
    commands: mpsc::Sender<Command>,
}

impl LifecycleCoordinator {
    pub fn new(
        worker: &WorkerConfig,
        config: &BridgeConfig,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            worker_id: worker.worker_id.clone(),
            variant_count: worker.variant_count,
            max_unfinished_tasks: worker.max_unfinished_tasks,
            unknown_failure_policy: config.unknown_failure_policy,
            task_ttl: config.timeouts.task_ttl(),
            origin_retention: config.timeouts.origin_retention(),
            registry: Mutex::new(Registry::default()),
            interactions: InteractionWaiter::new(),
            commands,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Default number of upscale variants for this worker
    pub fn variant_count(&self) -> u8 {
        self.variant_count
    }

    // ---------------------------------------------------------------------
    // Admission
    // ---------------------------------------------------------------------

    /// Register a generate task and queue its imagine command
    pub async fn admit_generate(&self, submission: GenerateSubmission) -> Result<ResultReceiver> {
        if submission.auto_upscale
            && (submission.expected_count == 0 || submission.expected_count > wire::GRID_SIZE)
        {
            return Err(BridgeError::InvalidParameter(format!(
                "expected variant count must be between 1 and {}",
                wire::GRID_SIZE
            )));
        }

        let task_id = submission.task_id.clone();
        let receiver = {
            let mut registry = self.registry.lock();
            self.check_capacity(&registry)?;

            let (mut runtime, receiver) = TaskRuntime::new(
                task_id.clone(),
                TaskKind::Generate,
                submission.auto_upscale,
                submission.expected_count,
            );
            runtime.keyword_hash = Some(submission_hash(
                &submission.canonical_prompt,
                submission.seed,
            ));
            self.insert(&mut registry, runtime)?;
            receiver
        };

        log_task_operation(
            "admit_generate",
            &self.worker_id,
            task_id.as_str(),
            &TaskState::Created.to_string(),
            Some(&submission.canonical_prompt),
        );

        self.enqueue(
            &task_id,
            Command::Imagine {
                task_id: task_id.clone(),
                prompt: submission.canonical_prompt,
                fast_mode: submission.fast_mode,
            },
        )
        .await?;
        Ok(receiver)
    }

    /// Register a describe task and queue its upload and command
    pub async fn admit_describe(&self, submission: DescribeSubmission) -> Result<ResultReceiver> {
        if submission.bytes.is_empty() {
            return Err(BridgeError::InvalidParameter(
                "describe requires image bytes".to_string(),
            ));
        }

        let task_id = submission.task_id.clone();
        let receiver = {
            let mut registry = self.registry.lock();
            self.check_capacity(&registry)?;
            let (runtime, receiver) =
                TaskRuntime::new(task_id.clone(), TaskKind::Describe, false, 0);
            self.insert(&mut registry, runtime)?;
            receiver
        };

        log_task_operation(
            "admit_describe",
            &self.worker_id,
            task_id.as_str(),
            &TaskState::Created.to_string(),
            Some(&submission.filename),
        );

        self.enqueue(
            &task_id,
            Command::Describe {
                task_id: task_id.clone(),
                filename: submission.filename,
                size: submission.size,
                bytes: submission.bytes,
            },
        )
        .await?;
        Ok(receiver)
    }

    /// Register a per-index upscale waiter against a generated origin
    pub async fn admit_upscale(&self, task_id: &TaskId, index: u8) -> Result<ResultReceiver> {
        if index == 0 || index > wire::GRID_SIZE {
            return Err(BridgeError::InvalidParameter(format!(
                "upscale index must be between 1 and {}, got {index}",
                wire::GRID_SIZE
            )));
        }

        let (receiver, command) = {
            let mut registry = self.registry.lock();
            self.open_manual_upscale(&mut registry, task_id, index)?
        };

        log_task_operation(
            "admit_upscale",
            &self.worker_id,
            task_id.as_str(),
            &TaskState::ManualUpscaling.to_string(),
            Some(&format!("index {index}")),
        );

        if let Err(e) = self.commands.send(command).await {
            debug!(command = %e.0, "Dispatch loop closed");
            self.fail_upscale_index(task_id, index, "dispatch loop closed");
            return Err(BridgeError::ChannelClosed {
                task_id: task_id.to_string(),
            });
        }
        Ok(receiver)
    }

    fn open_manual_upscale(
        &self,
        registry: &mut Registry,
        task_id: &TaskId,
        index: u8,
    ) -> Result<(ResultReceiver, Command)> {
        if registry.index.get(task_id).is_none() {
            let anchor = registry
                .anchors
                .get(task_id)
                .cloned()
                .ok_or_else(|| BridgeError::task_not_found(task_id.as_str()))?;
            self.check_capacity(registry)?;
            registry
                .index
                .insert(TaskRuntime::reopen_for_manual_upscale(&anchor));
        }

        let runtime = registry
            .index
            .get_mut(task_id)
            .ok_or_else(|| BridgeError::task_not_found(task_id.as_str()))?;

        if runtime.state != TaskState::ManualUpscaling {
            return Err(BridgeError::InvalidTaskState {
                task_id: task_id.to_string(),
                state: runtime.state.to_string(),
                reason: "origin not yet resolved".to_string(),
            });
        }

        let (Some(origin_message_id), Some(origin_artifact_id)) = (
            runtime.origin_message_id.clone(),
            runtime.origin_artifact_id.clone(),
        ) else {
            let state = runtime.state.to_string();
            if !runtime.has_index_waiters() {
                registry.index.remove(task_id);
            }
            return Err(BridgeError::InvalidTaskState {
                task_id: task_id.to_string(),
                state,
                reason: "origin artifact has no identifier".to_string(),
            });
        };

        let receiver = runtime.add_index_waiter(index)?;
        Ok((
            receiver,
            Command::Upscale {
                task_id: task_id.clone(),
                index,
                origin_message_id,
                origin_artifact_id,
                origin: UpscaleOrigin::Manual,
            },
        ))
    }

    fn check_capacity(&self, registry: &Registry) -> Result<()> {
        let live = registry.index.len();
        if live >= self.max_unfinished_tasks {
            warn!(
                worker_id = %self.worker_id,
                live = live,
                ceiling = self.max_unfinished_tasks,
                "Admission rejected, too many live tasks"
            );
            return Err(BridgeError::TooManyTasks {
                worker_id: self.worker_id.clone(),
                live,
                ceiling: self.max_unfinished_tasks,
            });
        }
        Ok(())
    }

    fn insert(&self, registry: &mut Registry, runtime: TaskRuntime) -> Result<()> {
        let task_id = runtime.task_id.clone();
        if registry.anchors.contains_key(&task_id) || !registry.index.insert(runtime) {
            return Err(BridgeError::InvalidParameter(format!(
                "task id {task_id} already in use"
            )));
        }
        Ok(())
    }

    async fn enqueue(&self, task_id: &TaskId, command: Command) -> Result<()> {
        if let Err(e) = self.commands.send(command).await {
            debug!(command = %e.0, "Dispatch loop closed");
            self.fail_task(task_id, "dispatch loop closed");
            return Err(BridgeError::ChannelClosed {
                task_id: task_id.to_string(),
            });
        }
        Ok(())
    }

    /// Queue a command produced by event application
    pub async fn enqueue_follow_up(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|e| BridgeError::ChannelClosed {
                task_id: e.0.task_id().to_string(),
            })
    }

    // ---------------------------------------------------------------------
    // Event application
    // ---------------------------------------------------------------------

    /// Apply one classified event. Returns follow-up commands to enqueue.
    ///
    /// Never fails: a miss is logged and dropped.
    pub fn apply(&self, classification: Classification) -> Vec<Command> {
        match classification {
            Classification::Failure {
                keys,
                message_id,
                title,
                description,
                known,
            } => {
                self.apply_failure(&keys, &message_id, &title, &description, known);
                Vec::new()
            }
            Classification::OriginArtifact {
                key,
                message_id,
                url,
                artifact_id,
            } => self.apply_origin(&key, &message_id, &url, artifact_id),
            Classification::DerivedArtifact {
                referenced_message_id,
                message_id,
                url,
                index,
            } => {
                self.apply_derived(&referenced_message_id, &message_id, &url, index);
                Vec::new()
            }
            Classification::InteractionAnnounced {
                interaction_id,
                command_name,
            } => {
                self.apply_announcement(&interaction_id, &command_name);
                Vec::new()
            }
            Classification::InteractionReply {
                interaction_id,
                description,
            } => {
                self.apply_reply(&interaction_id, &description);
                Vec::new()
            }
            Classification::Ignored { reason } => {
                debug!(worker_id = %self.worker_id, reason = reason, "Event ignored");
                Vec::new()
            }
        }
    }

    fn apply_failure(
        &self,
        keys: &[CorrelationKey],
        message_id: &str,
        title: &str,
        description: &str,
        known: bool,
    ) {
        if !known && self.unknown_failure_policy == UnknownFailurePolicy::LogOnly {
            warn!(
                worker_id = %self.worker_id,
                title = %title,
                description = %description,
                "Unknown failure title, leaving task to time out"
            );
            return;
        }

        let mut registry = self.registry.lock();
        if !registry.recent.record(message_id) {
            debug!(worker_id = %self.worker_id, message_id = %message_id, "Redelivered failure notice dropped");
            return;
        }
        let Some(task_id) = keys
            .iter()
            .find_map(|key| registry.index.lookup(key).cloned())
        else {
            let miss = BridgeError::CorrelationMiss {
                key: keys
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            debug!(worker_id = %self.worker_id, title = %title, "{miss}");
            return;
        };

        let message = format!("{title} {description}").trim().to_string();
        warn!(
            worker_id = %self.worker_id,
            task_id = %task_id,
            title = %title,
            description = %description,
            "Task failed upstream"
        );
        self.resolve_failure(&mut registry, &task_id, &message);
    }

    fn apply_origin(
        &self,
        key: &CorrelationKey,
        message_id: &str,
        url: &str,
        artifact_id: Option<String>,
    ) -> Vec<Command> {
        let mut registry = self.registry.lock();
        let bound = CorrelationKey::ByOriginMessageId(message_id.to_string());
        if registry.index.lookup(&bound).is_some() || !registry.recent.record(message_id) {
            debug!(worker_id = %self.worker_id, message_id = %message_id, "Redelivered origin artifact dropped");
            return Vec::new();
        }
        let Some(task_id) = registry.index.lookup(key).cloned() else {
            debug!(worker_id = %self.worker_id, key = %key, "Origin artifact for unknown task");
            return Vec::new();
        };

        registry.index.bind_origin(&task_id, message_id);
        let Some(runtime) = registry.index.get_mut(&task_id) else {
            return Vec::new();
        };
        runtime.origin_artifact_url = Some(url.to_string());
        runtime.origin_artifact_id = artifact_id.clone();

        let auto_upscale = runtime.auto_upscale && artifact_id.is_some();
        if runtime.auto_upscale && artifact_id.is_none() {
            warn!(
                task_id = %task_id,
                url = %url,
                "Origin artifact has no identifier, completing without upscales"
            );
        }
        if let Err(e) = runtime.transition(&TaskEvent::OriginReceived { auto_upscale }) {
            warn!(task_id = %task_id, error = %e, "Duplicate origin artifact dropped");
            return Vec::new();
        }

        info!(
            worker_id = %self.worker_id,
            task_id = %task_id,
            origin_message_id = %message_id,
            state = %runtime.state,
            "Origin artifact received"
        );

        match (auto_upscale, artifact_id) {
            (true, Some(artifact_id)) => (1..=runtime.expected_count)
                .map(|index| Command::Upscale {
                    task_id: task_id.clone(),
                    index,
                    origin_message_id: message_id.to_string(),
                    origin_artifact_id: artifact_id.clone(),
                    origin: UpscaleOrigin::Auto,
                })
                .collect(),
            _ => {
                let result = TaskResult::generation(task_id.clone(), url, Vec::new());
                self.complete(&mut registry, &task_id, result);
                Vec::new()
            }
        }
    }

    fn apply_derived(
        &self,
        referenced_message_id: &str,
        message_id: &str,
        url: &str,
        index: Option<u8>,
    ) {
        let mut registry = self.registry.lock();
        let key = CorrelationKey::ByOriginMessageId(referenced_message_id.to_string());
        let Some(runtime) = registry.index.lookup_mut(&key) else {
            debug!(
                worker_id = %self.worker_id,
                referenced_message_id = %referenced_message_id,
                "Derived artifact for unknown origin"
            );
            return;
        };
        let task_id = runtime.task_id.clone();
        let state = runtime.state;

        match state {
            TaskState::AutoUpscaling => match runtime.record_artifact(message_id, url) {
                ArtifactProgress::Duplicate => {
                    debug!(task_id = %task_id, message_id = %message_id, "Duplicate derived artifact");
                }
                ArtifactProgress::Overflow => {
                    warn!(task_id = %task_id, message_id = %message_id, "Derived artifact beyond expected count");
                }
                ArtifactProgress::Accepted { settled, expected } => {
                    info!(
                        task_id = %task_id,
                        settled = settled,
                        expected = expected,
                        "Derived artifact received"
                    );
                    if settled >= expected {
                        self.settle_auto_upscale(&mut registry, &task_id);
                    }
                }
            },
            TaskState::ManualUpscaling => {
                let Some(index) = index else {
                    warn!(task_id = %task_id, message_id = %message_id, "Derived artifact without variant index");
                    return;
                };
                let result = TaskResult::upscale(task_id.clone(), index, url);
                if runtime.resolve_index(index, result) {
                    info!(task_id = %task_id, index = index, "Manual upscale resolved");
                } else {
                    debug!(task_id = %task_id, index = index, "No waiter for upscaled index");
                }
                if !runtime.has_index_waiters() {
                    registry.index.remove(&task_id);
                }
            }
            state => {
                debug!(task_id = %task_id, state = %state, "Derived artifact in unexpected state");
            }
        }
    }

    fn apply_announcement(&self, interaction_id: &str, command_name: &str) {
        let Some(task_id) = self.interactions.announce(interaction_id, command_name) else {
            return;
        };
        let mut registry = self.registry.lock();
        if registry.index.bind_interaction(&task_id, interaction_id) {
            debug!(
                task_id = %task_id,
                interaction_id = %interaction_id,
                command = %command_name,
                "Interaction bound"
            );
        }
    }

    fn apply_reply(&self, interaction_id: &str, description: &str) {
        let mut registry = self.registry.lock();
        let key = CorrelationKey::ByInteractionId(interaction_id.to_string());
        let Some(runtime) = registry.index.lookup_mut(&key) else {
            debug!(interaction_id = %interaction_id, "Interaction reply for unknown task");
            return;
        };
        if runtime.kind != TaskKind::Describe {
            debug!(task_id = %runtime.task_id, "Interaction reply for non-describe task");
            return;
        }
        let task_id = runtime.task_id.clone();
        if let Err(e) = runtime.transition(&TaskEvent::DescriptionReceived) {
            warn!(task_id = %task_id, error = %e, "Duplicate description dropped");
            return;
        }
        let result = TaskResult::description(task_id.clone(), description);
        self.complete(&mut registry, &task_id, result);
    }

    // ---------------------------------------------------------------------
    // Dispatch feedback
    // ---------------------------------------------------------------------

    /// Register the expectation the dispatcher waits on
    pub fn expect_interaction(&self, command_name: &str, task_id: &TaskId) -> oneshot::Receiver<String> {
        self.interactions.expect(command_name, task_id.clone())
    }

    pub fn clear_interaction(&self, task_id: &TaskId) {
        self.interactions.clear(task_id);
    }

    /// Count an auto-upscale slot whose command could not be sent
    pub fn record_upscale_dispatch_failure(&self, task_id: &TaskId, index: u8) {
        let mut registry = self.registry.lock();
        let Some(runtime) = registry.index.get_mut(task_id) else {
            return;
        };
        if runtime.state != TaskState::AutoUpscaling {
            return;
        }
        let settled = runtime.record_failed_slot();
        warn!(
            task_id = %task_id,
            index = index,
            settled = settled,
            expected = runtime.expected_count,
            "Upscale dispatch failed, slot counted"
        );
        if runtime.all_slots_settled() {
            self.settle_auto_upscale(&mut registry, task_id);
        }
    }

    /// Fail the waiter of one manual upscale index
    pub fn fail_upscale_index(&self, task_id: &TaskId, index: u8, reason: &str) -> bool {
        let mut registry = self.registry.lock();
        let Some(runtime) = registry.index.get_mut(task_id) else {
            return false;
        };
        let delivered = runtime.resolve_index(index, TaskResult::failure(task_id.clone(), reason));
        if runtime.state == TaskState::ManualUpscaling && !runtime.has_index_waiters() {
            registry.index.remove(task_id);
        }
        delivered
    }

    /// Resolve a live task as failed and remove it
    pub fn fail_task(&self, task_id: &TaskId, reason: &str) -> bool {
        let mut registry = self.registry.lock();
        if !registry.index.contains(task_id) {
            return false;
        }
        self.resolve_failure(&mut registry, task_id, reason);
        true
    }

    /// Bind an interaction id directly
    pub fn bind_interaction(&self, task_id: &TaskId, interaction_id: &str) -> bool {
        self.registry
            .lock()
            .index
            .bind_interaction(task_id, interaction_id)
    }

    // ---------------------------------------------------------------------
    // Reaping
    // ---------------------------------------------------------------------

    /// Remove a task whose caller stopped waiting
    pub fn reap(&self, task_id: &TaskId) -> bool {
        let mut registry = self.registry.lock();
        let Some(runtime) = registry.index.remove(task_id) else {
            return false;
        };
        self.interactions.clear(task_id);
        log_task_operation(
            "reap",
            &self.worker_id,
            task_id.as_str(),
            &runtime.state.to_string(),
            Some("caller timeout"),
        );
        true
    }

    /// Drop the waiter of one manual upscale index after a caller timeout
    pub fn reap_index(&self, task_id: &TaskId, index: u8) -> bool {
        let mut registry = self.registry.lock();
        let Some(runtime) = registry.index.get_mut(task_id) else {
            return false;
        };
        let removed = runtime.resolve_index(
            index,
            TaskResult::failure(task_id.clone(), "upscale timed out"),
        );
        if runtime.state == TaskState::ManualUpscaling && !runtime.has_index_waiters() {
            registry.index.remove(task_id);
        }
        removed
    }

    /// Fail tasks older than the TTL and drop expired anchors
    pub fn reap_expired(&self, now: Instant) -> ReapReport {
        let mut registry = self.registry.lock();
        let expired: Vec<TaskId> = registry
            .index
            .tasks()
            .filter(|runtime| now.saturating_duration_since(runtime.started) >= self.task_ttl)
            .map(|runtime| runtime.task_id.clone())
            .collect();
        for task_id in &expired {
            self.resolve_failure(&mut registry, task_id, "task expired");
        }

        let retention = self.origin_retention;
        let mut dropped_anchors = Vec::new();
        registry.anchors.retain(|task_id, anchor| {
            let keep = now.saturating_duration_since(anchor.retained_at) < retention;
            if !keep {
                dropped_anchors.push(task_id.clone());
            }
            keep
        });

        if !expired.is_empty() || !dropped_anchors.is_empty() {
            info!(
                worker_id = %self.worker_id,
                expired = expired.len(),
                dropped_anchors = dropped_anchors.len(),
                "Reaper pass removed tasks"
            );
        }

        ReapReport {
            expired_tasks: expired,
            dropped_anchors,
        }
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn live_count(&self) -> usize {
        self.registry.lock().index.len()
    }

    pub fn anchor_count(&self) -> usize {
        self.registry.lock().anchors.len()
    }

    pub fn task_state(&self, task_id: &TaskId) -> Option<TaskState> {
        self.registry.lock().index.get(task_id).map(|r| r.state)
    }

    /// Whether the task is live or still anchored for manual upscale
    pub fn knows(&self, task_id: &TaskId) -> bool {
        let registry = self.registry.lock();
        registry.index.contains(task_id) || registry.anchors.contains_key(task_id)
    }

    // ---------------------------------------------------------------------
    // Resolution helpers (registry lock held)
    // ---------------------------------------------------------------------

    fn settle_auto_upscale(&self, registry: &mut Registry, task_id: &TaskId) {
        let Some(runtime) = registry.index.get_mut(task_id) else {
            return;
        };
        if runtime.artifacts().is_empty() {
            self.resolve_failure(registry, task_id, "all upscale dispatches failed");
            return;
        }
        if let Err(e) = runtime.transition(&TaskEvent::UpscalesSettled) {
            warn!(task_id = %task_id, error = %e, "Upscales settled in unexpected state");
            return;
        }
        let origin_url = runtime.origin_artifact_url.clone().unwrap_or_default();
        let artifacts = runtime.take_artifacts();
        let result = TaskResult::generation(task_id.clone(), origin_url, artifacts);
        self.complete(registry, task_id, result);
    }

    /// Deliver a success, keep the origin anchor and remove the task
    fn complete(&self, registry: &mut Registry, task_id: &TaskId, result: TaskResult) {
        let Some(mut runtime) = registry.index.remove(task_id) else {
            return;
        };
        if runtime.kind == TaskKind::Generate {
            if let Some(anchor) = runtime.anchor() {
                registry.anchors.insert(task_id.clone(), anchor);
            }
        }
        let delivered = runtime.deliver(result);
        log_task_operation(
            "complete",
            &self.worker_id,
            task_id.as_str(),
            &runtime.state.to_string(),
            (!delivered).then_some("caller no longer waiting"),
        );
    }

    fn resolve_failure(&self, registry: &mut Registry, task_id: &TaskId, message: &str) {
        let Some(mut runtime) = registry.index.remove(task_id) else {
            return;
        };
        self.interactions.clear(task_id);

        if runtime.state == TaskState::ManualUpscaling {
            let failed = runtime.fail_all_waiters(message);
            debug!(task_id = %task_id, waiters = failed, "Manual upscale waiters failed");
            return;
        }

        if let Err(e) = runtime.transition(&TaskEvent::Fail) {
            warn!(task_id = %task_id, error = %e, "Failure for already resolved task");
            return;
        }
        runtime.fail_all_waiters(message);
        runtime.deliver(TaskResult::failure(task_id.clone(), message));
        log_task_operation(
            "fail",
            &self.worker_id,
            task_id.as_str(),
            &runtime.state.to_string(),
            Some(message),
        );
    }
}
