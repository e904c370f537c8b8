//! Result payloads delivered on task and waiter channels.

use serde::{Deserialize, Serialize};

use super::TaskId;

/// One resolution of a task or of a single upscale index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub successful: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResultPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultPayload {
    Generation {
        origin_artifact_url: String,
        artifact_urls: Vec<String>,
    },
    Upscale {
        index: u8,
        artifact_url: String,
    },
    Description {
        description: String,
    },
}

impl TaskResult {
    pub fn generation(
        task_id: TaskId,
        origin_artifact_url: impl Into<String>,
        artifact_urls: Vec<String>,
    ) -> Self {
        Self {
            task_id,
            successful: true,
            message: "success".to_string(),
            payload: Some(ResultPayload::Generation {
                origin_artifact_url: origin_artifact_url.into(),
                artifact_urls,
            }),
        }
    }

    pub fn upscale(task_id: TaskId, index: u8, artifact_url: impl Into<String>) -> Self {
        Self {
            task_id,
            successful: true,
            message: "success".to_string(),
            payload: Some(ResultPayload::Upscale {
                index,
                artifact_url: artifact_url.into(),
            }),
        }
    }

    pub fn description(task_id: TaskId, description: impl Into<String>) -> Self {
        Self {
            task_id,
            successful: true,
            message: "success".to_string(),
            payload: Some(ResultPayload::Description {
                description: description.into(),
            }),
        }
    }

    pub fn failure(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            task_id,
            successful: false,
            message: message.into(),
            payload: None,
        }
    }

    pub fn artifact_urls(&self) -> &[String] {
        match &self.payload {
            Some(ResultPayload::Generation { artifact_urls, .. }) => artifact_urls,
            _ => &[],
        }
    }

    pub fn origin_artifact_url(&self) -> Option<&str> {
        match &self.payload {
            Some(ResultPayload::Generation {
                origin_artifact_url,
                ..
            }) => Some(origin_artifact_url),
            _ => None,
        }
    }
}
