//! # Imagine Service
//!
//! Explicitly constructed entry point for the API layer. It owns the worker
//! pool and the router; several independent services can coexist in one
//! process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use imagine_bridge::config::loader::ConfigLoader;
//! use imagine_bridge::service::{GenerateRequest, ImagineService};
//!
//! # async fn example() -> imagine_bridge::Result<()> {
//! let config = ConfigLoader::load(Some("config/bridge.yaml"))?;
//! let service = ImagineService::start_http(config).await?;
//!
//! let handle = service
//!     .submit_generate(GenerateRequest::new("a lighthouse at dusk").auto_upscale(true))
//!     .await?;
//! let result = service.wait(handle).await?;
//! println!("{:?}", result.artifact_urls());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, WorkerConfig};
use crate::correlation::hashing::canonical_prompt;
use crate::dispatch::{GatewayTransport, HttpGatewayTransport};
use crate::error::{BridgeError, Result};
use crate::events::GatewayEvent;
use crate::lifecycle::{DescribeSubmission, GenerateSubmission, ReapReport};
use crate::pool::{WorkerConnection, WorkerPoolRouter};
use crate::task::{ResultReceiver, TaskId, TaskResult};

/// Caller parameters of a generate request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub params: String,
    pub fast_mode: bool,
    pub auto_upscale: bool,
    /// Overrides the worker's configured variant count
    pub expected_variant_count: Option<u8>,
    /// Fixed seed; random when absent
    pub seed: Option<u32>,
    /// Pin the task to a named worker
    pub worker_id: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    pub fn fast_mode(mut self, fast_mode: bool) -> Self {
        self.fast_mode = fast_mode;
        self
    }

    pub fn auto_upscale(mut self, auto_upscale: bool) -> Self {
        self.auto_upscale = auto_upscale;
        self
    }

    pub fn expected_variant_count(mut self, count: u8) -> Self {
        self.expected_variant_count = Some(count);
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn on_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }
}

/// Pending result of one submission
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub worker_id: String,
    /// Set for manual upscale waiters
    pub index: Option<u8>,
    pub timeout: Duration,
    receiver: ResultReceiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker_id: String,
    pub live_tasks: usize,
    pub anchored_origins: usize,
    pub dispatch_running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub workers: Vec<WorkerStats>,
    pub pinned_tasks: usize,
}

impl ServiceStats {
    pub fn live_tasks(&self) -> usize {
        self.workers.iter().map(|w| w.live_tasks).sum()
    }
}

pub struct ImagineService {
    config: BridgeConfig,
    workers: HashMap<String, Arc<WorkerConnection>>,
    router: WorkerPoolRouter,
}

impl std::fmt::Debug for ImagineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagineService")
            .field("workers", &self.router.worker_ids())
            .field("pinned_tasks", &self.router.pinned_count())
            .finish()
    }
}

impl ImagineService {
    /// Validate the configuration and start one worker per entry.
    ///
    /// `transport_for` builds the outbound transport of each worker.
    pub async fn start<F>(config: BridgeConfig, transport_for: F) -> Result<Self>
    where
        F: Fn(&WorkerConfig) -> Result<Arc<dyn GatewayTransport>>,
    {
        config.validate()?;

        let mut workers = HashMap::with_capacity(config.workers.len());
        let mut worker_ids = Vec::with_capacity(config.workers.len());
        for worker in &config.workers {
            let transport = transport_for(worker)?;
            let connection = WorkerConnection::start(worker, &config, transport).await?;
            worker_ids.push(worker.worker_id.clone());
            workers.insert(worker.worker_id.clone(), Arc::new(connection));
        }

        info!(workers = worker_ids.len(), "Imagine service started");
        Ok(Self {
            config,
            workers,
            router: WorkerPoolRouter::new(worker_ids),
        })
    }

    /// Start with the reqwest transport for every worker
    pub async fn start_http(config: BridgeConfig) -> Result<Self> {
        let gateway = config.gateway.clone();
        Self::start(config, move |worker| {
            let transport = HttpGatewayTransport::new(worker, &gateway)?;
            Ok(Arc::new(transport) as Arc<dyn GatewayTransport>)
        })
        .await
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn worker(&self, worker_id: &str) -> Result<&Arc<WorkerConnection>> {
        self.workers
            .get(worker_id)
            .ok_or_else(|| BridgeError::WorkerNotFound {
                worker_id: worker_id.to_string(),
            })
    }

    pub fn router(&self) -> &WorkerPoolRouter {
        &self.router
    }

    pub async fn submit_generate(&self, request: GenerateRequest) -> Result<TaskHandle> {
        if request.prompt.trim().is_empty() {
            return Err(BridgeError::InvalidParameter(
                "prompt must not be empty".to_string(),
            ));
        }

        let task_id = TaskId::generate();
        let worker_id = self
            .router
            .assign(&task_id, request.worker_id.as_deref())?;
        let worker = self.worker(&worker_id)?;

        let seed = request.seed.unwrap_or_else(rand::random);
        let submission = GenerateSubmission {
            task_id: task_id.clone(),
            canonical_prompt: canonical_prompt(&request.prompt, &request.params, seed),
            seed,
            fast_mode: request.fast_mode,
            auto_upscale: request.auto_upscale,
            expected_count: request
                .expected_variant_count
                .unwrap_or_else(|| worker.coordinator().variant_count()),
        };

        let receiver = self
            .admit(&task_id, worker.coordinator().admit_generate(submission))
            .await?;
        Ok(TaskHandle {
            task_id,
            worker_id,
            index: None,
            timeout: self.config.timeouts.generate(),
            receiver,
        })
    }

    /// Upscale one variant of a generated origin on the worker that owns it
    pub async fn submit_upscale(&self, task_id: &TaskId, index: u8) -> Result<TaskHandle> {
        let worker_id = self.router.worker_for(task_id)?;
        let worker = self.worker(&worker_id)?;
        let receiver = worker.coordinator().admit_upscale(task_id, index).await?;
        Ok(TaskHandle {
            task_id: task_id.clone(),
            worker_id,
            index: Some(index),
            timeout: self.config.timeouts.upscale(),
            receiver,
        })
    }

    pub async fn submit_describe(
        &self,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        size: u64,
    ) -> Result<TaskHandle> {
        let task_id = TaskId::generate();
        let worker_id = self.router.assign(&task_id, None)?;
        let worker = self.worker(&worker_id)?;

        let submission = DescribeSubmission {
            task_id: task_id.clone(),
            filename: filename.into(),
            size,
            bytes,
        };
        let receiver = self
            .admit(&task_id, worker.coordinator().admit_describe(submission))
            .await?;
        Ok(TaskHandle {
            task_id,
            worker_id,
            index: None,
            timeout: self.config.timeouts.describe(),
            receiver,
        })
    }

    async fn admit<Fut>(&self, task_id: &TaskId, admission: Fut) -> Result<ResultReceiver>
    where
        Fut: std::future::Future<Output = Result<ResultReceiver>>,
    {
        admission.await.inspect_err(|e| {
            debug!(task_id = %task_id, error = %e, "Admission failed, releasing pin");
            self.router.release(task_id);
        })
    }

    /// Event intake for one worker's gateway stream
    pub fn handle_event(&self, worker_id: &str, event: GatewayEvent) -> Result<()> {
        self.worker(worker_id)?.handle_event(event);
        Ok(())
    }

    /// Wait with the handle's own timeout
    pub async fn wait(&self, handle: TaskHandle) -> Result<TaskResult> {
        let timeout = handle.timeout;
        self.wait_for(handle, timeout).await
    }

    /// Wait for a result; on expiry the task is removed from its worker
    pub async fn wait_for(&self, handle: TaskHandle, timeout: Duration) -> Result<TaskResult> {
        let TaskHandle {
            task_id,
            worker_id,
            index,
            receiver,
            ..
        } = handle;
        let coordinator = Arc::clone(self.worker(&worker_id)?.coordinator());

        let outcome = tokio::time::timeout(timeout, receiver).await;
        let result = match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(BridgeError::ChannelClosed {
                task_id: task_id.to_string(),
            }),
            Err(_) => {
                let reaped = match index {
                    Some(index) => coordinator.reap_index(&task_id, index),
                    None => coordinator.reap(&task_id),
                };
                warn!(
                    task_id = %task_id,
                    worker_id = %worker_id,
                    reaped = reaped,
                    timeout_secs = timeout.as_secs(),
                    "Caller wait timed out"
                );
                Err(BridgeError::Timeout {
                    task_id: task_id.to_string(),
                    waited_secs: timeout.as_secs(),
                })
            }
        };

        if !coordinator.knows(&task_id) {
            self.router.release(&task_id);
        }
        result
    }

    /// Fail expired tasks on every worker and release pins nobody needs
    pub fn reap_expired(&self, now: Instant) -> ReapReport {
        let mut report = ReapReport::default();
        for worker in self.workers.values() {
            let worker_report = worker.coordinator().reap_expired(now);
            report.expired_tasks.extend(worker_report.expired_tasks);
            report.dropped_anchors.extend(worker_report.dropped_anchors);
        }

        let released = self.router.sweep(|task_id, worker_id| {
            self.workers
                .get(worker_id)
                .is_some_and(|worker| worker.coordinator().knows(task_id))
        });
        if released > 0 {
            debug!(released = released, "Released stale worker pins");
        }
        report
    }

    /// Run the reaper every `reaper_interval` until the service is dropped
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        let period = self.config.timeouts.reaper_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(live) = service.upgrade() else {
                    break;
                };
                live.reap_expired(Instant::now());
            }
            debug!("Reaper stopped");
        })
    }

    pub fn stats(&self) -> ServiceStats {
        let mut workers: Vec<WorkerStats> = self
            .workers
            .values()
            .map(|worker| WorkerStats {
                worker_id: worker.worker_id().to_string(),
                live_tasks: worker.coordinator().live_count(),
                anchored_origins: worker.coordinator().anchor_count(),
                dispatch_running: worker.is_running(),
            })
            .collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        ServiceStats {
            workers,
            pinned_tasks: self.router.pinned_count(),
        }
    }

    /// Stop every dispatch loop
    pub fn shutdown(&self) {
        for worker in self.workers.values() {
            worker.shutdown();
        }
        info!("Imagine service shut down");
    }
}
