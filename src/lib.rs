#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Imagine Bridge
//!
//! Correlation and lifecycle engine that exposes an asynchronous,
//! chat-gateway-hosted image generation service as a request/response API.
//!
//! ## Overview
//!
//! Commands are sent to the upstream service as chat interactions; results
//! come back later as unsolicited gateway events that carry no request id.
//! The bridge keeps a registry of in-flight tasks per pooled worker account,
//! derives correlation keys from event content and routes each event to the
//! task that caused it.
//!
//! ## Architecture
//!
//! Each worker owns one single-flight dispatch loop and one partition of the
//! task registry. Event intake classifies messages and applies them to the
//! registry without ever waiting on dispatch. The service pins every task to
//! the worker that admitted it.
//!
//! ## Module Organization
//!
//! - [`service`] - Entry point: submission, waiting, reaping
//! - [`pool`] - Worker connections and task-to-worker pinning
//! - [`lifecycle`] - Per-worker coordinator and interaction acknowledgements
//! - [`dispatch`] - Commands, wire payloads, pacing and the transport seam
//! - [`events`] - Inbound event model and classification
//! - [`correlation`] - Correlation keys, content hashing and the task index
//! - [`task`] - Task runtimes, states and results
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imagine_bridge::config::loader::ConfigLoader;
//! use imagine_bridge::service::{GenerateRequest, ImagineService};
//!
//! # async fn example() -> imagine_bridge::Result<()> {
//! imagine_bridge::logging::init_structured_logging();
//! let config = ConfigLoader::load(Some("config/bridge.yaml"))?;
//! let service = std::sync::Arc::new(ImagineService::start_http(config).await?);
//! service.spawn_reaper();
//!
//! let handle = service
//!     .submit_generate(GenerateRequest::new("a lighthouse at dusk").params("--ar 16:9"))
//!     .await?;
//! let result = service.wait(handle).await?;
//! println!("origin: {:?}", result.origin_artifact_url());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod constants;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod pool;
pub mod service;
pub mod task;

pub use config::{BridgeConfig, UnknownFailurePolicy, WorkerConfig};
pub use error::{BridgeError, Result};
pub use events::GatewayEvent;
pub use service::{GenerateRequest, ImagineService, ServiceStats, TaskHandle};
pub use task::{ResultPayload, TaskId, TaskResult, TaskState};
