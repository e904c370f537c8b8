//! Logical commands accepted by the per-worker dispatch loop.

use std::fmt;

use crate::constants::commands;
use crate::task::TaskId;

/// Who asked for an upscale; decides where a dispatch failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleOrigin {
    /// Issued by the coordinator after an origin artifact arrived
    Auto,
    /// Issued on behalf of a caller waiting on one index
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Imagine {
        task_id: TaskId,
        /// Canonical prompt, seed included
        prompt: String,
        fast_mode: bool,
    },
    Upscale {
        task_id: TaskId,
        index: u8,
        origin_message_id: String,
        origin_artifact_id: String,
        origin: UpscaleOrigin,
    },
    Describe {
        task_id: TaskId,
        filename: String,
        size: u64,
        bytes: Vec<u8>,
    },
}

impl Command {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Imagine { task_id, .. }
            | Self::Upscale { task_id, .. }
            | Self::Describe { task_id, .. } => task_id,
        }
    }

    /// Upstream name used in logs and interaction matching
    pub fn name(&self) -> &'static str {
        match self {
            Self::Imagine { .. } => commands::IMAGINE,
            Self::Upscale { .. } => "upscale",
            Self::Describe { .. } => commands::DESCRIBE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upscale { task_id, index, .. } => write!(f, "upscale[{index}] for {task_id}"),
            other => write!(f, "{} for {}", other.name(), other.task_id()),
        }
    }
}
