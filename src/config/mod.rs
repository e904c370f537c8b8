//! # Bridge Configuration
//!
//! Configuration for the worker pool, outbound pacing, caller-side timeouts and
//! the upstream gateway endpoint.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use imagine_bridge::config::loader::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load(Some("config/bridge.yaml"))?;
//! println!("{} workers configured", config.workers.len());
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::constants::{system, wire};
use crate::error::{BridgeError, Result};

/// Root configuration object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// One entry per pooled upstream account
    pub workers: Vec<WorkerConfig>,
    pub pacing: PacingConfig,
    pub timeouts: TimeoutConfig,
    pub gateway: GatewayConfig,
    /// What to do with failure-looking events whose title is not enumerated
    pub unknown_failure_policy: UnknownFailurePolicy,
}

/// Credentials and limits of one worker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub token: String,
    pub application_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub session_id: String,
    /// Number of upscale variants requested in auto-upscale mode
    pub variant_count: u8,
    /// Admission ceiling for live tasks on this worker
    pub max_unfinished_tasks: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            token: String::new(),
            application_id: String::new(),
            channel_id: String::new(),
            guild_id: None,
            session_id: String::new(),
            variant_count: system::DEFAULT_VARIANT_COUNT,
            max_unfinished_tasks: system::DEFAULT_MAX_UNFINISHED_TASKS,
        }
    }
}

/// Randomized delay applied after every outbound send
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            jitter_ms: 1000,
        }
    }
}

impl PacingConfig {
    /// No delay at all; used by tests
    pub fn disabled() -> Self {
        Self {
            min_delay_ms: 0,
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub generate_secs: u64,
    pub upscale_secs: u64,
    pub describe_secs: u64,
    /// How long the dispatcher waits for the interaction-announced event
    pub interaction_ack_secs: u64,
    /// Age after which the reaper forcibly fails a live task
    pub task_ttl_secs: u64,
    /// How long a completed generate task stays available for manual upscale
    pub origin_retention_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generate_secs: 1200,
            upscale_secs: 600,
            describe_secs: 300,
            interaction_ack_secs: 10,
            task_ttl_secs: 1800,
            origin_retention_secs: 3600,
            reaper_interval_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn generate(&self) -> Duration {
        Duration::from_secs(self.generate_secs)
    }

    pub fn upscale(&self) -> Duration {
        Duration::from_secs(self.upscale_secs)
    }

    pub fn describe(&self) -> Duration {
        Duration::from_secs(self.describe_secs)
    }

    pub fn interaction_ack(&self) -> Duration {
        Duration::from_secs(self.interaction_ack_secs)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }

    pub fn origin_retention(&self) -> Duration {
        Duration::from_secs(self.origin_retention_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: system::DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFailurePolicy {
    /// Log the title and leave the task to time out
    #[default]
    LogOnly,
    /// Resolve the matched task as failed
    FailTask,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            return Err(BridgeError::Configuration(
                "at least one worker must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            worker.validate()?;
            if !seen.insert(worker.worker_id.as_str()) {
                return Err(BridgeError::Configuration(format!(
                    "duplicate worker id: {}",
                    worker.worker_id
                )));
            }
        }

        if self.timeouts.interaction_ack_secs == 0 {
            return Err(BridgeError::Configuration(
                "timeouts.interaction_ack_secs must be greater than 0".to_string(),
            ));
        }

        if self.gateway.api_base_url.is_empty() {
            return Err(BridgeError::Configuration(
                "gateway.api_base_url must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("worker_id", &self.worker_id),
            ("token", &self.token),
            ("application_id", &self.application_id),
            ("channel_id", &self.channel_id),
            ("session_id", &self.session_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BridgeError::Configuration(format!(
                    "workers.{field} is required (worker '{}')",
                    self.worker_id
                )));
            }
        }

        if self.variant_count == 0 || self.variant_count > wire::GRID_SIZE {
            return Err(BridgeError::Configuration(format!(
                "workers.variant_count must be between 1 and {} (worker '{}')",
                wire::GRID_SIZE,
                self.worker_id
            )));
        }

        if self.max_unfinished_tasks == 0 {
            return Err(BridgeError::Configuration(format!(
                "workers.max_unfinished_tasks must be greater than 0 (worker '{}')",
                self.worker_id
            )));
        }

        Ok(())
    }
}
