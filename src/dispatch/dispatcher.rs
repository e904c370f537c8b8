//! # Command Dispatcher
//!
//! One dispatch loop per worker drains a depth-1 command queue and performs
//! every outbound call serially, pacing after each send. Prompt-hash
//! correlation cannot tell two identical in-flight prompts apart, so at most
//! one command per worker is ever unacknowledged.
//!
//! Send failures are reported back to the coordinator as task failures and
//! never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::command::{Command, UpscaleOrigin};
use super::pacing::Pacer;
use super::payload::{self, CommandCatalog, PayloadContext};
use super::transport::GatewayTransport;
use crate::constants::commands;
use crate::error::BridgeError;
use crate::lifecycle::LifecycleCoordinator;
use crate::logging::log_dispatch_operation;
use crate::task::TaskId;

/// Queue depth between admission and the dispatch loop
pub const COMMAND_QUEUE_DEPTH: usize = 1;

pub fn command_channel() -> (mpsc::Sender<Command>, mpsc::Receiver<Command>) {
    mpsc::channel(COMMAND_QUEUE_DEPTH)
}

/// Outcome of one outbound send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted(u16),
    Rejected(String),
}

#[derive(Debug)]
pub struct Dispatcher {
    worker_id: String,
    transport: Arc<dyn GatewayTransport>,
    context: PayloadContext,
    catalog: CommandCatalog,
    pacer: Pacer,
    coordinator: Arc<LifecycleCoordinator>,
    ack_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        context: PayloadContext,
        catalog: CommandCatalog,
        pacer: Pacer,
        coordinator: Arc<LifecycleCoordinator>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            worker_id: coordinator.worker_id().to_string(),
            transport,
            context,
            catalog,
            pacer,
            coordinator,
            ack_timeout,
        }
    }

    /// Drain the queue until every sender is gone
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) {
        info!(worker_id = %self.worker_id, "Dispatch loop started");
        while let Some(command) = commands.recv().await {
            self.dispatch(command).await;
        }
        info!(worker_id = %self.worker_id, "Dispatch loop stopped");
    }

    pub async fn dispatch(&self, command: Command) {
        debug!(worker_id = %self.worker_id, command = %command, "Dispatching command");
        match command {
            Command::Imagine {
                task_id,
                prompt,
                fast_mode,
            } => self.dispatch_imagine(&task_id, &prompt, fast_mode).await,
            Command::Upscale {
                task_id,
                index,
                origin_message_id,
                origin_artifact_id,
                origin,
            } => {
                self.dispatch_upscale(
                    &task_id,
                    index,
                    &origin_message_id,
                    &origin_artifact_id,
                    origin,
                )
                .await
            }
            Command::Describe {
                task_id,
                filename,
                size,
                bytes,
            } => self.dispatch_describe(&task_id, &filename, size, bytes).await,
        }
    }

    async fn dispatch_imagine(&self, task_id: &TaskId, prompt: &str, fast_mode: bool) {
        if fast_mode {
            self.switch_mode(true).await;
        }

        self.send_imagine(task_id, prompt).await;

        // The off-switch runs whatever happened to the imagine command
        if fast_mode {
            self.switch_mode(false).await;
        }
    }

    async fn send_imagine(&self, task_id: &TaskId, prompt: &str) {
        let Some(command) = self.catalog.get(commands::IMAGINE) else {
            self.report_failure(task_id, "imagine command not available");
            return;
        };
        let body = payload::imagine(&self.context, command, prompt);
        self.send_acknowledged(task_id, commands::IMAGINE, &body)
            .await;
    }

    async fn dispatch_describe(&self, task_id: &TaskId, filename: &str, size: u64, bytes: Vec<u8>) {
        let Some(command) = self.catalog.get(commands::DESCRIBE) else {
            self.report_failure(task_id, "describe command not available");
            return;
        };

        let started = Instant::now();
        let uploaded = match self.transport.upload_attachment(filename, size, bytes).await {
            Ok(uploaded) => uploaded,
            Err(e) => {
                log_dispatch_operation(
                    &self.worker_id,
                    "upload_attachment",
                    Some(task_id.as_str()),
                    "failed",
                    started.elapsed().as_millis() as u64,
                );
                self.report_failure(task_id, &format!("attachment upload failed: {e}"));
                return;
            }
        };

        let body = payload::describe(&self.context, command, filename, &uploaded);
        self.send_acknowledged(task_id, commands::DESCRIBE, &body)
            .await;
    }

    async fn dispatch_upscale(
        &self,
        task_id: &TaskId,
        index: u8,
        origin_message_id: &str,
        origin_artifact_id: &str,
        origin: UpscaleOrigin,
    ) {
        let body = payload::upscale(&self.context, index, origin_artifact_id, origin_message_id);
        let outcome = self.send("upscale", Some(task_id), &body).await;
        self.pacer.pause().await;

        if let SendOutcome::Rejected(reason) = outcome {
            match origin {
                UpscaleOrigin::Auto => {
                    self.coordinator
                        .record_upscale_dispatch_failure(task_id, index);
                }
                UpscaleOrigin::Manual => {
                    self.coordinator.fail_upscale_index(task_id, index, &reason);
                }
            }
        }
    }

    async fn switch_mode(&self, fast: bool) -> SendOutcome {
        let name = if fast { commands::FAST } else { commands::RELAX };
        let Some(command) = self.catalog.get(name) else {
            warn!(worker_id = %self.worker_id, command = name, "Mode switch command not available");
            return SendOutcome::Rejected(format!("{name} command not available"));
        };
        let body = payload::switch_mode(&self.context, command);
        let outcome = self.send(name, None, &body).await;
        self.pacer.pause().await;
        outcome
    }

    /// Send a slash command and wait for its interaction announcement.
    ///
    /// The expectation is registered before the send so an announcement
    /// racing the HTTP response is not lost.
    async fn send_acknowledged<T: serde::Serialize>(
        &self,
        task_id: &TaskId,
        command_name: &str,
        body: &T,
    ) {
        let ack = self.coordinator.expect_interaction(command_name, task_id);
        let outcome = self.send(command_name, Some(task_id), body).await;

        match outcome {
            SendOutcome::Accepted(_) => match tokio::time::timeout(self.ack_timeout, ack).await {
                Ok(Ok(interaction_id)) => {
                    debug!(
                        task_id = %task_id,
                        interaction_id = %interaction_id,
                        "Command acknowledged"
                    );
                }
                Ok(Err(_)) => {
                    debug!(task_id = %task_id, "Interaction expectation superseded");
                }
                Err(_) => {
                    self.coordinator.clear_interaction(task_id);
                    warn!(
                        worker_id = %self.worker_id,
                        task_id = %task_id,
                        command = command_name,
                        timeout_secs = self.ack_timeout.as_secs(),
                        "No interaction announcement before timeout"
                    );
                }
            },
            SendOutcome::Rejected(reason) => {
                self.coordinator.clear_interaction(task_id);
                self.report_failure(task_id, &reason);
            }
        }

        self.pacer.pause().await;
    }

    async fn send<T: serde::Serialize>(
        &self,
        command_name: &str,
        task_id: Option<&TaskId>,
        body: &T,
    ) -> SendOutcome {
        let started = Instant::now();
        let outcome = match serde_json::to_string(body) {
            Err(e) => SendOutcome::Rejected(format!("payload serialization failed: {e}")),
            Ok(body) => match self.transport.send_interaction(body).await {
                Ok(status) if (200..300).contains(&status) => SendOutcome::Accepted(status),
                Ok(status) => SendOutcome::Rejected(format!(
                    "{command_name} rejected with status {status}"
                )),
                Err(e) => SendOutcome::Rejected(format!("{command_name} transport error: {e}")),
            },
        };

        let status = match &outcome {
            SendOutcome::Accepted(status) => status.to_string(),
            SendOutcome::Rejected(_) => "rejected".to_string(),
        };
        log_dispatch_operation(
            &self.worker_id,
            command_name,
            task_id.map(TaskId::as_str),
            &status,
            started.elapsed().as_millis() as u64,
        );
        if let SendOutcome::Rejected(reason) = &outcome {
            warn!(worker_id = %self.worker_id, command = command_name, reason = %reason, "Dispatch failed");
        }
        outcome
    }

    fn report_failure(&self, task_id: &TaskId, reason: &str) {
        let error = BridgeError::dispatch_failed(task_id.as_str(), reason);
        if !self.coordinator.fail_task(task_id, &error.to_string()) {
            debug!(task_id = %task_id, "Dispatch failure for task no longer live");
        }
    }
}
