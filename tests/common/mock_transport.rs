//! Scriptable in-memory gateway transport.
//!
//! Records every outbound body, answers with configurable statuses and, when
//! wired to an event feed, announces accepted slash commands the way the
//! upstream gateway does.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use parking_lot::Mutex;
use serde_json::Value;

use imagine_bridge::dispatch::{ApplicationCommand, GatewayTransport, TransportError};
use imagine_bridge::events::GatewayEvent;

pub const APPLICATION_ID: &str = "936929561302675456";

/// Name used for recorded component interactions
pub const UPSCALE: &str = "upscale";

#[derive(Debug, Clone)]
pub struct SentInteraction {
    pub command: String,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct Announcement {
    pub command: String,
    pub interaction_id: String,
}

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<SentInteraction>,
    announced: Vec<Announcement>,
    uploads: Vec<String>,
}

#[derive(Debug, Default)]
struct Script {
    /// Status returned every time a command is sent
    always: HashMap<String, u16>,
    /// Statuses consumed one per send before `always` applies
    next: HashMap<String, VecDeque<u16>>,
}

#[derive(Debug)]
struct Inner {
    catalog: Vec<ApplicationCommand>,
    recorded: Mutex<Recorded>,
    script: Mutex<Script>,
    announcer: Mutex<Option<UnboundedSender<GatewayEvent>>>,
    fail_uploads: AtomicBool,
    catalog_unavailable: AtomicBool,
    interaction_seq: AtomicU64,
}

/// Cloneable handle; clones share recordings and script
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    inner: Arc<Inner>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::with_catalog(default_catalog())
    }

    pub fn with_catalog(catalog: Vec<ApplicationCommand>) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                recorded: Mutex::new(Recorded::default()),
                script: Mutex::new(Script::default()),
                announcer: Mutex::new(None),
                fail_uploads: AtomicBool::new(false),
                catalog_unavailable: AtomicBool::new(false),
                interaction_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Announce accepted slash commands on this feed
    pub fn announce_to(&self, feed: UnboundedSender<GatewayEvent>) {
        *self.inner.announcer.lock() = Some(feed);
    }

    /// Answer every send of `command` with `status`
    pub fn respond_always(&self, command: &str, status: u16) {
        self.inner
            .script
            .lock()
            .always
            .insert(command.to_string(), status);
    }

    /// Answer the next send of `command` with `status`
    pub fn respond_next(&self, command: &str, status: u16) {
        self.inner
            .script
            .lock()
            .next
            .entry(command.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn fail_uploads(&self) {
        self.inner.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub fn fail_catalog(&self) {
        self.inner.catalog_unavailable.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentInteraction> {
        self.inner.recorded.lock().sent.clone()
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.inner
            .recorded
            .lock()
            .sent
            .iter()
            .map(|sent| sent.command.clone())
            .collect()
    }

    pub fn sent_bodies_for(&self, command: &str) -> Vec<Value> {
        self.inner
            .recorded
            .lock()
            .sent
            .iter()
            .filter(|sent| sent.command == command)
            .map(|sent| sent.body.clone())
            .collect()
    }

    /// Prompts of every imagine command sent so far
    pub fn imagine_prompts(&self) -> Vec<String> {
        self.sent_bodies_for(imagine_bridge::constants::commands::IMAGINE)
            .iter()
            .filter_map(|body| body["data"]["options"][0]["value"].as_str())
            .map(str::to_string)
            .collect()
    }

    /// Custom ids of every upscale button pressed so far
    pub fn upscale_custom_ids(&self) -> Vec<String> {
        self.sent_bodies_for(UPSCALE)
            .iter()
            .filter_map(|body| body["data"]["custom_id"].as_str())
            .map(str::to_string)
            .collect()
    }

    pub fn announced(&self) -> Vec<Announcement> {
        self.inner.recorded.lock().announced.clone()
    }

    pub fn interaction_id_for(&self, command: &str) -> Option<String> {
        self.inner
            .recorded
            .lock()
            .announced
            .iter()
            .rev()
            .find(|announcement| announcement.command == command)
            .map(|announcement| announcement.interaction_id.clone())
    }

    pub fn uploads(&self) -> Vec<String> {
        self.inner.recorded.lock().uploads.clone()
    }

    /// Poll until `count` sends of `command` were recorded
    pub async fn wait_for_sends(&self, command: &str, count: usize) -> bool {
        self.wait_until(|transport| transport.sent_bodies_for(command).len() >= count)
            .await
    }

    pub async fn wait_until<F>(&self, condition: F) -> bool
    where
        F: Fn(&Self) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition(self)
    }

    fn status_for(&self, command: &str) -> u16 {
        let mut script = self.inner.script.lock();
        if let Some(status) = script.next.get_mut(command).and_then(VecDeque::pop_front) {
            return status;
        }
        script.always.get(command).copied().unwrap_or(204)
    }
}

#[async_trait]
impl GatewayTransport for RecordingTransport {
    async fn send_interaction(&self, body: String) -> Result<u16, TransportError> {
        let body: Value =
            serde_json::from_str(&body).map_err(|e| TransportError::MalformedResponse {
                endpoint: "interactions".to_string(),
                reason: e.to_string(),
            })?;
        let command = match body["type"].as_u64() {
            Some(2) => body["data"]["name"].as_str().unwrap_or_default().to_string(),
            _ => UPSCALE.to_string(),
        };
        let status = self.status_for(&command);

        // the announcement is queued before the send becomes observable
        if (200..300).contains(&status) && command != UPSCALE {
            let announcer = self.inner.announcer.lock().clone();
            if let Some(feed) = announcer {
                let seq = self.inner.interaction_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let interaction_id = format!("interaction-{seq}");
                self.inner.recorded.lock().announced.push(Announcement {
                    command: command.clone(),
                    interaction_id: interaction_id.clone(),
                });
                let _ = feed.unbounded_send(GatewayEvent::InteractionAnnounced {
                    interaction_id,
                    command_name: command.clone(),
                });
            }
        }

        self.inner
            .recorded
            .lock()
            .sent
            .push(SentInteraction { command, body });
        Ok(status)
    }

    async fn upload_attachment(
        &self,
        filename: &str,
        _size: u64,
        _bytes: Vec<u8>,
    ) -> Result<String, TransportError> {
        if self.inner.fail_uploads.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                endpoint: "attachments".to_string(),
                status: 500,
            });
        }
        self.inner.recorded.lock().uploads.push(filename.to_string());
        Ok(format!("uploads/0/{filename}"))
    }

    async fn application_commands(&self) -> Result<Vec<ApplicationCommand>, TransportError> {
        if self.inner.catalog_unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable(
                "command catalog offline".to_string(),
            ));
        }
        Ok(self.inner.catalog.clone())
    }
}

pub fn default_catalog() -> Vec<ApplicationCommand> {
    ["imagine", "describe", "fast", "relax"]
        .iter()
        .enumerate()
        .map(|(n, name)| {
            ApplicationCommand::new(
                format!("93878390158{n}"),
                APPLICATION_ID,
                "1166847114203123795",
                *name,
            )
        })
        .collect()
}
