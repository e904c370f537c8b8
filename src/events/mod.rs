//! Inbound gateway events and their classification.

pub mod classifier;
pub mod model;

pub use classifier::{classify, Classification};
pub use model::{Attachment, Embed, GatewayEvent, InboundMessage, InteractionRef};
