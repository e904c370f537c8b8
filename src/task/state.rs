use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered, command queued or sent, no origin artifact yet
    #[default]
    Created,
    /// Origin received, upscale commands issued, collecting variants
    AutoUpscaling,
    /// Re-opened for caller-initiated per-index upscales
    ManualUpscaling,
    /// Result delivered successfully
    Completed,
    /// Failure delivered
    Failed,
}

/// Events that drive the task state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Origin artifact matched; `auto_upscale` selects the follow-up
    OriginReceived { auto_upscale: bool },
    /// Every expected upscale slot settled (artifact or counted dispatch failure)
    UpscalesSettled,
    /// Describe reply matched
    DescriptionReceived,
    Fail,
}

impl TaskState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Target state for an event, or `None` if the transition is not allowed
    pub fn on_event(self, event: &TaskEvent) -> Option<TaskState> {
        let target = match (self, event) {
            (Self::Created, TaskEvent::OriginReceived { auto_upscale: true }) => {
                Self::AutoUpscaling
            }
            (Self::Created, TaskEvent::OriginReceived { auto_upscale: false }) => Self::Completed,
            (Self::Created, TaskEvent::DescriptionReceived) => Self::Completed,
            (Self::AutoUpscaling, TaskEvent::UpscalesSettled) => Self::Completed,
            (Self::Created | Self::AutoUpscaling | Self::ManualUpscaling, TaskEvent::Fail) => {
                Self::Failed
            }
            _ => return None,
        };
        Some(target)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::AutoUpscaling => write!(f, "auto_upscaling"),
            Self::ManualUpscaling => write!(f, "manual_upscaling"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "auto_upscaling" => Ok(Self::AutoUpscaling),
            "manual_upscaling" => Ok(Self::ManualUpscaling),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}
