//! Shared integration-test harness: a running service whose workers talk to
//! recording transports and read events from in-memory feeds.

#![allow(dead_code)]

pub mod builders;
pub mod mock_transport;
pub mod strategies;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedSender};

use imagine_bridge::config::{BridgeConfig, PacingConfig, WorkerConfig};
use imagine_bridge::dispatch::GatewayTransport;
use imagine_bridge::events::GatewayEvent;
use imagine_bridge::service::ImagineService;
use imagine_bridge::BridgeError;

pub use mock_transport::RecordingTransport;

/// Upper bound for any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

pub fn worker_config(worker_id: &str) -> WorkerConfig {
    WorkerConfig {
        worker_id: worker_id.to_string(),
        token: format!("token-{worker_id}"),
        application_id: mock_transport::APPLICATION_ID.to_string(),
        channel_id: "1100".to_string(),
        guild_id: Some("1000".to_string()),
        session_id: format!("session-{worker_id}"),
        ..WorkerConfig::default()
    }
}

/// Unpaced configuration with a one second acknowledgement window
pub fn test_config(worker_ids: &[&str]) -> BridgeConfig {
    let mut config = BridgeConfig {
        workers: worker_ids.iter().map(|id| worker_config(id)).collect(),
        pacing: PacingConfig::disabled(),
        ..BridgeConfig::default()
    };
    config.timeouts.interaction_ack_secs = 1;
    config
}

pub struct TestBridge {
    pub service: Arc<ImagineService>,
    transports: HashMap<String, RecordingTransport>,
    feeds: HashMap<String, UnboundedSender<GatewayEvent>>,
}

impl TestBridge {
    pub async fn start(worker_ids: &[&str]) -> Self {
        Self::start_with(test_config(worker_ids)).await
    }

    pub async fn start_with(config: BridgeConfig) -> Self {
        let mut transports = HashMap::new();
        let mut feeds = HashMap::new();
        let mut intakes = Vec::new();
        for worker in &config.workers {
            let transport = RecordingTransport::new();
            let (feed, intake) = unbounded();
            transport.announce_to(feed.clone());
            transports.insert(worker.worker_id.clone(), transport);
            feeds.insert(worker.worker_id.clone(), feed);
            intakes.push((worker.worker_id.clone(), intake));
        }

        let factory = transports.clone();
        let service = ImagineService::start(config, move |worker| {
            factory
                .get(&worker.worker_id)
                .cloned()
                .map(|transport| Arc::new(transport) as Arc<dyn GatewayTransport>)
                .ok_or_else(|| BridgeError::WorkerNotFound {
                    worker_id: worker.worker_id.clone(),
                })
        })
        .await
        .expect("service should start");
        let service = Arc::new(service);

        for (worker_id, intake) in intakes {
            service
                .worker(&worker_id)
                .expect("configured worker")
                .spawn_event_intake(intake);
        }

        Self {
            service,
            transports,
            feeds,
        }
    }

    pub fn transport(&self, worker_id: &str) -> &RecordingTransport {
        self.transports
            .get(worker_id)
            .expect("transport for configured worker")
    }

    /// Deliver an event on the worker's feed, behind any pending announcements
    pub fn emit(&self, worker_id: &str, event: GatewayEvent) {
        self.feeds
            .get(worker_id)
            .expect("feed for configured worker")
            .unbounded_send(event)
            .expect("event intake should be running");
    }

    /// Wait for the worker's `nth` imagine send and return its prompt
    pub async fn sent_prompt(&self, worker_id: &str, nth: usize) -> String {
        let transport = self.transport(worker_id);
        assert!(
            transport.wait_for_sends("imagine", nth + 1).await,
            "imagine #{nth} was never sent on {worker_id}"
        );
        transport.imagine_prompts()[nth].clone()
    }

    /// Poll until the worker holds `count` live tasks
    pub async fn wait_for_live(&self, worker_id: &str, count: usize) -> bool {
        let coordinator = Arc::clone(
            self.service
                .worker(worker_id)
                .expect("configured worker")
                .coordinator(),
        );
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if coordinator.live_count() == count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        coordinator.live_count() == count
    }
}
