//! Outbound command path: logical commands, wire payloads, the transport
//! seam and the per-worker single-flight dispatch loop.

pub mod command;
pub mod dispatcher;
pub mod pacing;
pub mod payload;
pub mod transport;

pub use command::{Command, UpscaleOrigin};
pub use dispatcher::{command_channel, Dispatcher, SendOutcome};
pub use pacing::Pacer;
pub use payload::{ApplicationCommand, CommandCatalog, PayloadContext};
pub use transport::{GatewayTransport, HttpGatewayTransport, TransportError};
