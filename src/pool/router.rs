//! Worker Pool Router
//!
//! Pins every task to the worker that holds its registry entry. Task state is
//! worker-local, so follow-up operations such as manual upscales must reach
//! the same worker as the original submission.

use dashmap::DashMap;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::task::TaskId;

#[derive(Debug, Default)]
pub struct WorkerPoolRouter {
    worker_ids: Vec<String>,
    pins: DashMap<TaskId, String>,
}

impl WorkerPoolRouter {
    pub fn new(worker_ids: Vec<String>) -> Self {
        Self {
            worker_ids,
            pins: DashMap::new(),
        }
    }

    /// Pin a task to a worker; an existing pin always wins.
    ///
    /// New tasks go to `preferred` if given, otherwise to a uniformly random
    /// worker.
    pub fn assign(&self, task_id: &TaskId, preferred: Option<&str>) -> Result<String> {
        if let Some(pinned) = self.pins.get(task_id) {
            return Ok(pinned.value().clone());
        }

        let worker_id = match preferred {
            Some(preferred) => self
                .worker_ids
                .iter()
                .find(|id| id.as_str() == preferred)
                .cloned()
                .ok_or_else(|| BridgeError::WorkerNotFound {
                    worker_id: preferred.to_string(),
                })?,
            None => self
                .worker_ids
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| {
                    BridgeError::Configuration("worker pool is empty".to_string())
                })?,
        };

        let pinned = self
            .pins
            .entry(task_id.clone())
            .or_insert(worker_id)
            .value()
            .clone();
        debug!(task_id = %task_id, worker_id = %pinned, "Task pinned to worker");
        Ok(pinned)
    }

    /// Worker a task was pinned to
    pub fn worker_for(&self, task_id: &TaskId) -> Result<String> {
        self.pins
            .get(task_id)
            .map(|pinned| pinned.value().clone())
            .ok_or_else(|| BridgeError::task_not_found(task_id.as_str()))
    }

    pub fn release(&self, task_id: &TaskId) -> bool {
        self.pins.remove(task_id).is_some()
    }

    /// Drop every pin for which `keep` returns false
    pub fn sweep<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&TaskId, &str) -> bool,
    {
        let before = self.pins.len();
        self.pins.retain(|task_id, worker_id| keep(task_id, worker_id));
        before.saturating_sub(self.pins.len())
    }

    pub fn worker_ids(&self) -> &[String] {
        &self.worker_ids
    }

    pub fn pinned_count(&self) -> usize {
        self.pins.len()
    }
}
