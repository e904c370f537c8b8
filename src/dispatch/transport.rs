//! Outbound Gateway Transport
//!
//! The seam between the dispatch loop and the upstream REST API. The engine
//! only hands over fully serialized interaction bodies and reads back the
//! status code; connection handling stays behind this trait.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::payload::ApplicationCommand;
use crate::config::{GatewayConfig, WorkerConfig};
use crate::constants::wire;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Outbound half of one worker's gateway connection
#[async_trait]
pub trait GatewayTransport: Send + Sync + Debug {
    /// Send one serialized interaction body, returning the HTTP status
    async fn send_interaction(&self, body: String) -> Result<u16, TransportError>;

    /// Upload an attachment and return the upstream file name to reference
    async fn upload_attachment(
        &self,
        filename: &str,
        size: u64,
        bytes: Vec<u8>,
    ) -> Result<String, TransportError>;

    /// Application commands available to this worker's account
    async fn application_commands(&self) -> Result<Vec<ApplicationCommand>, TransportError>;
}

#[derive(Debug, Serialize)]
struct AttachmentSlotRequest<'a> {
    files: Vec<AttachmentSlot<'a>>,
}

#[derive(Debug, Serialize)]
struct AttachmentSlot<'a> {
    filename: &'a str,
    file_size: u64,
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct AttachmentSlotResponse {
    attachments: Vec<UploadTarget>,
}

#[derive(Debug, Deserialize)]
struct UploadTarget {
    upload_url: String,
    upload_filename: String,
}

/// reqwest-backed transport against the upstream REST API
#[derive(Debug, Clone)]
pub struct HttpGatewayTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
    application_id: String,
    channel_id: String,
}

impl HttpGatewayTransport {
    pub fn new(worker: &WorkerConfig, gateway: &GatewayConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(gateway.request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: gateway.api_base_url.trim_end_matches('/').to_string(),
            token: worker.token.clone(),
            application_id: worker.application_id.clone(),
            channel_id: worker.channel_id.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request_upload_slot(
        &self,
        filename: &str,
        size: u64,
    ) -> Result<UploadTarget, TransportError> {
        let endpoint = self.endpoint(&format!("channels/{}/attachments", self.channel_id));
        let request = AttachmentSlotRequest {
            files: vec![AttachmentSlot {
                filename,
                file_size: size,
                id: wire::DESCRIBE_ATTACHMENT_SLOT,
            }],
        };

        let response = self
            .client
            .post(&endpoint)
            .header(AUTHORIZATION, &self.token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let slots: AttachmentSlotResponse =
            response
                .json()
                .await
                .map_err(|e| TransportError::MalformedResponse {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                })?;

        slots
            .attachments
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::MalformedResponse {
                endpoint,
                reason: "no attachment slot returned".to_string(),
            })
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl GatewayTransport for HttpGatewayTransport {
    async fn send_interaction(&self, body: String) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(self.endpoint("interactions"))
            .header(AUTHORIZATION, &self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    async fn upload_attachment(
        &self,
        filename: &str,
        size: u64,
        bytes: Vec<u8>,
    ) -> Result<String, TransportError> {
        let target = self.request_upload_slot(filename, size).await?;
        debug!(filename = %filename, size = size, "Uploading attachment");

        let response = self
            .client
            .put(&target.upload_url)
            .header(CONTENT_TYPE, content_type_for(filename))
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: target.upload_url,
                status: status.as_u16(),
            });
        }

        Ok(target.upload_filename)
    }

    async fn application_commands(&self) -> Result<Vec<ApplicationCommand>, TransportError> {
        let endpoint = self.endpoint(&format!("applications/{}/commands", self.application_id));
        let response = self
            .client
            .get(&endpoint)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::MalformedResponse {
                endpoint,
                reason: e.to_string(),
            })
    }
}
