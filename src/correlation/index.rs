//! # Correlation Index
//!
//! Per-worker registry of live tasks plus the surrogate-key lookups used to
//! route inbound events back to them. Every mutation keeps the primary map
//! and all key maps consistent, so callers never touch a key map directly.
//!
//! ## Keyword collisions
//!
//! Two live tasks can share a keyword hash only if they were submitted with
//! the same canonical prompt and the same seed. The keyword slot keeps them in
//! insertion order and a keyword lookup always yields the earliest one; the
//! next task becomes eligible once the earlier one binds its origin message or
//! leaves the registry.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::debug;

use super::hashing::KeywordHash;
use crate::task::{TaskId, TaskRuntime};

/// Strategy used to match an inbound event to a live task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Content hash of the echoed prompt; valid until the origin is bound
    ByKeywordHash(KeywordHash),
    /// Id of the message that carried the origin artifact
    ByOriginMessageId(String),
    /// Id of the interaction that accepted the task's command
    ByInteractionId(String),
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByKeywordHash(hash) => write!(f, "keyword_hash={hash}"),
            Self::ByOriginMessageId(id) => write!(f, "origin_message_id={id}"),
            Self::ByInteractionId(id) => write!(f, "interaction_id={id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct CorrelationIndex {
    tasks: HashMap<TaskId, TaskRuntime>,
    by_keyword: HashMap<KeywordHash, VecDeque<TaskId>>,
    by_origin_message: HashMap<String, TaskId>,
    by_interaction: HashMap<String, TaskId>,
}

impl CorrelationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its id and every key it already carries.
    ///
    /// Returns `false` (and leaves the index untouched) if the id is taken.
    pub fn insert(&mut self, runtime: TaskRuntime) -> bool {
        if self.tasks.contains_key(&runtime.task_id) {
            return false;
        }
        let task_id = runtime.task_id.clone();
        if let Some(hash) = runtime.keyword_hash.clone() {
            if runtime.origin_message_id.is_none() {
                self.by_keyword
                    .entry(hash)
                    .or_default()
                    .push_back(task_id.clone());
            }
        }
        if let Some(message_id) = &runtime.origin_message_id {
            self.by_origin_message
                .insert(message_id.clone(), task_id.clone());
        }
        if let Some(interaction_id) = &runtime.interaction_id {
            self.by_interaction
                .insert(interaction_id.clone(), task_id.clone());
        }
        self.tasks.insert(task_id, runtime);
        true
    }

    /// Resolve a correlation key to the id of a live task
    pub fn lookup(&self, key: &CorrelationKey) -> Option<&TaskId> {
        match key {
            CorrelationKey::ByKeywordHash(hash) => {
                self.by_keyword.get(hash).and_then(|queue| queue.front())
            }
            CorrelationKey::ByOriginMessageId(id) => self.by_origin_message.get(id),
            CorrelationKey::ByInteractionId(id) => self.by_interaction.get(id),
        }
    }

    pub fn lookup_mut(&mut self, key: &CorrelationKey) -> Option<&mut TaskRuntime> {
        let task_id = self.lookup(key)?.clone();
        self.tasks.get_mut(&task_id)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&TaskRuntime> {
        self.tasks.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &TaskId) -> Option<&mut TaskRuntime> {
        self.tasks.get_mut(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Bind the origin message and retire keyword matching for the task
    pub fn bind_origin(&mut self, task_id: &TaskId, message_id: &str) -> bool {
        let Some(runtime) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if let Some(previous) = runtime.origin_message_id.replace(message_id.to_string()) {
            self.by_origin_message.remove(&previous);
        }
        if let Some(hash) = runtime.keyword_hash.clone() {
            Self::retire_keyword(&mut self.by_keyword, &hash, task_id);
        }
        self.by_origin_message
            .insert(message_id.to_string(), task_id.clone());
        debug!(task_id = %task_id, origin_message_id = %message_id, "Origin bound, keyword retired");
        true
    }

    pub fn bind_interaction(&mut self, task_id: &TaskId, interaction_id: &str) -> bool {
        let Some(runtime) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if let Some(previous) = runtime
            .interaction_id
            .replace(interaction_id.to_string())
        {
            self.by_interaction.remove(&previous);
        }
        self.by_interaction
            .insert(interaction_id.to_string(), task_id.clone());
        true
    }

    /// Remove a task and every key pointing at it
    pub fn remove(&mut self, task_id: &TaskId) -> Option<TaskRuntime> {
        let runtime = self.tasks.remove(task_id)?;
        if let Some(hash) = &runtime.keyword_hash {
            Self::retire_keyword(&mut self.by_keyword, hash, task_id);
        }
        if let Some(message_id) = &runtime.origin_message_id {
            if self.by_origin_message.get(message_id) == Some(task_id) {
                self.by_origin_message.remove(message_id);
            }
        }
        if let Some(interaction_id) = &runtime.interaction_id {
            if self.by_interaction.get(interaction_id) == Some(task_id) {
                self.by_interaction.remove(interaction_id);
            }
        }
        Some(runtime)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRuntime> {
        self.tasks.values()
    }

    fn retire_keyword(
        by_keyword: &mut HashMap<KeywordHash, VecDeque<TaskId>>,
        hash: &KeywordHash,
        task_id: &TaskId,
    ) {
        if let Some(queue) = by_keyword.get_mut(hash) {
            queue.retain(|queued| queued != task_id);
            if queue.is_empty() {
                by_keyword.remove(hash);
            }
        }
    }
}
