//! Worker Connection
//!
//! One pooled upstream account: its dispatch loop, its event intake path and
//! its partition of the task registry. Dispatch and event intake run
//! concurrently and never wait on each other.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{BridgeConfig, WorkerConfig};
use crate::dispatch::{
    command_channel, Command, CommandCatalog, Dispatcher, GatewayTransport, Pacer, PayloadContext,
};
use crate::error::{BridgeError, Result};
use crate::events::{classify, GatewayEvent};
use crate::lifecycle::LifecycleCoordinator;

#[derive(Debug)]
pub struct WorkerConnection {
    worker_id: String,
    coordinator: Arc<LifecycleCoordinator>,
    dispatch_loop: JoinHandle<()>,
}

impl WorkerConnection {
    /// Fetch the command catalog and start the dispatch loop
    pub async fn start(
        worker: &WorkerConfig,
        config: &BridgeConfig,
        transport: Arc<dyn GatewayTransport>,
    ) -> Result<Self> {
        let catalog = CommandCatalog::new(transport.application_commands().await.map_err(
            |e| {
                error!(worker_id = %worker.worker_id, error = %e, "Failed to fetch command catalog");
                BridgeError::Transport(e)
            },
        )?);
        info!(
            worker_id = %worker.worker_id,
            commands = catalog.len(),
            "Command catalog loaded"
        );

        let (sender, receiver) = command_channel();
        let coordinator = Arc::new(LifecycleCoordinator::new(worker, config, sender));
        let dispatcher = Dispatcher::new(
            transport,
            PayloadContext::from(worker),
            catalog,
            Pacer::new(&config.pacing),
            Arc::clone(&coordinator),
            config.timeouts.interaction_ack(),
        );
        let dispatch_loop = tokio::spawn(dispatcher.run(receiver));

        Ok(Self {
            worker_id: worker.worker_id.clone(),
            coordinator,
            dispatch_loop,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn coordinator(&self) -> &Arc<LifecycleCoordinator> {
        &self.coordinator
    }

    /// Classify and apply one inbound event.
    ///
    /// Follow-up commands are queued from a detached task so a full command
    /// queue never stalls event intake.
    pub fn handle_event(&self, event: GatewayEvent) {
        let follow_ups = self.coordinator.apply(classify(&event));
        if follow_ups.is_empty() {
            return;
        }
        debug!(
            worker_id = %self.worker_id,
            commands = follow_ups.len(),
            "Queueing follow-up commands"
        );
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            enqueue_follow_ups(&coordinator, follow_ups).await;
        });
    }

    /// Consume a gateway event stream until it ends
    pub fn spawn_event_intake<S>(self: &Arc<Self>, events: S) -> JoinHandle<()>
    where
        S: Stream<Item = GatewayEvent> + Send + 'static,
    {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut events = std::pin::pin!(events);
            while let Some(event) = events.next().await {
                worker.handle_event(event);
            }
            info!(worker_id = %worker.worker_id, "Gateway event stream ended");
        })
    }

    pub fn is_running(&self) -> bool {
        !self.dispatch_loop.is_finished()
    }

    pub fn shutdown(&self) {
        self.dispatch_loop.abort();
    }
}

impl Drop for WorkerConnection {
    fn drop(&mut self) {
        self.dispatch_loop.abort();
    }
}

async fn enqueue_follow_ups(coordinator: &LifecycleCoordinator, commands: Vec<Command>) {
    for command in commands {
        let (task_id, index) = match &command {
            Command::Upscale { task_id, index, .. } => (task_id.clone(), *index),
            other => {
                debug!(command = %other, "Unexpected follow-up command");
                continue;
            }
        };
        if coordinator.enqueue_follow_up(command).await.is_err() {
            coordinator.record_upscale_dispatch_failure(&task_id, index);
        }
    }
}
