//! Typed inbound gateway events.
//!
//! Only the fields the classifier reads are modelled. The gateway transport
//! that produces these is outside this crate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    MessageCreate(InboundMessage),
    MessageUpdate(InboundMessage),
    /// Side-channel announcement of an accepted command
    InteractionAnnounced {
        interaction_id: String,
        command_name: String,
    },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreate(_) => "message_create",
            Self::MessageUpdate(_) => "message_update",
            Self::InteractionAnnounced { .. } => "interaction_announced",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    pub id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
    /// Id of the message this one replies to
    pub referenced_message_id: Option<String>,
    /// Interaction that produced this message, if any
    pub interaction: Option<InteractionRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRef {
    pub id: String,
    pub name: String,
}
