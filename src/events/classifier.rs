//! # Event Classifier
//!
//! Pure classification of one gateway event into what it means for the task
//! registry, together with the correlation keys to look it up by. No registry
//! access happens here.
//!
//! Failure notices are recognised first. A failure may carry no attachment at
//! all, and it must never fall through into artifact handling.

use tracing::debug;

use super::model::{GatewayEvent, InboundMessage};
use crate::constants::{commands, is_create_failure_title, is_update_failure_title};
use crate::correlation::hashing::{
    artifact_id_from_url, hash_from_failure_footer, hash_from_message_content,
    variant_index_from_content,
};
use crate::correlation::CorrelationKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Failure notice; `keys` are tried in order until one hits
    Failure {
        keys: Vec<CorrelationKey>,
        /// Id of the message carrying the notice
        message_id: String,
        title: String,
        description: String,
        /// Whether the title is one of the enumerated failure titles
        known: bool,
    },
    /// First artifact of a generate task
    OriginArtifact {
        key: CorrelationKey,
        message_id: String,
        url: String,
        artifact_id: Option<String>,
    },
    /// Upscaled variant replying to an origin message
    DerivedArtifact {
        referenced_message_id: String,
        message_id: String,
        url: String,
        index: Option<u8>,
    },
    InteractionAnnounced {
        interaction_id: String,
        command_name: String,
    },
    /// Reply that references an interaction instead of echoing content
    InteractionReply {
        interaction_id: String,
        description: String,
    },
    Ignored {
        reason: &'static str,
    },
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Failure { known: true, .. } => "failure",
            Self::Failure { known: false, .. } => "unknown_failure",
            Self::OriginArtifact { .. } => "origin_artifact",
            Self::DerivedArtifact { .. } => "derived_artifact",
            Self::InteractionAnnounced { .. } => "interaction_announced",
            Self::InteractionReply { .. } => "interaction_reply",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Which message event carried a failure notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageEvent {
    Created,
    Updated,
}

pub fn classify(event: &GatewayEvent) -> Classification {
    let classification = match event {
        GatewayEvent::MessageCreate(message) => classify_created(message),
        GatewayEvent::MessageUpdate(message) => classify_updated(message),
        GatewayEvent::InteractionAnnounced {
            interaction_id,
            command_name,
        } => Classification::InteractionAnnounced {
            interaction_id: interaction_id.clone(),
            command_name: command_name.clone(),
        },
    };
    debug!(
        event = event.kind(),
        classification = classification.label(),
        "Classified gateway event"
    );
    classification
}

fn classify_created(message: &InboundMessage) -> Classification {
    if let Some(failure) = failure_notice(message, MessageEvent::Created) {
        return failure;
    }

    let Some(attachment) = message.attachments.first() else {
        return unknown_failure(message).unwrap_or(Classification::Ignored {
            reason: "no attachment",
        });
    };

    match &message.referenced_message_id {
        Some(referenced) => Classification::DerivedArtifact {
            referenced_message_id: referenced.clone(),
            message_id: message.id.clone(),
            url: attachment.url.clone(),
            index: variant_index_from_content(&message.content),
        },
        None => match hash_from_message_content(&message.content) {
            Some(hash) => Classification::OriginArtifact {
                key: CorrelationKey::ByKeywordHash(hash),
                message_id: message.id.clone(),
                url: attachment.url.clone(),
                artifact_id: artifact_id_from_url(&attachment.url),
            },
            None => Classification::Ignored {
                reason: "origin content carries no prompt hash",
            },
        },
    }
}

fn classify_updated(message: &InboundMessage) -> Classification {
    if let Some(failure) = failure_notice(message, MessageEvent::Updated) {
        return failure;
    }

    if let Some(interaction) = &message.interaction {
        if interaction.name == commands::DESCRIBE {
            if let Some(embed) = message
                .embeds
                .iter()
                .find(|embed| !embed.description.trim().is_empty())
            {
                return Classification::InteractionReply {
                    interaction_id: interaction.id.clone(),
                    description: embed.description.clone(),
                };
            }
        }
    }

    Classification::Ignored {
        reason: "update without failure or reply",
    }
}

fn failure_notice(message: &InboundMessage, kind: MessageEvent) -> Option<Classification> {
    let embed = message.embeds.iter().find(|embed| match kind {
        MessageEvent::Created => is_create_failure_title(&embed.title),
        MessageEvent::Updated => is_update_failure_title(&embed.title),
    })?;

    let content_hash = match kind {
        MessageEvent::Created => embed.footer.as_deref().and_then(hash_from_failure_footer),
        MessageEvent::Updated => hash_from_message_content(&message.content),
    };

    Some(Classification::Failure {
        keys: failure_keys(message, content_hash.map(CorrelationKey::ByKeywordHash)),
        message_id: message.id.clone(),
        title: embed.title.clone(),
        description: embed.description.clone(),
        known: true,
    })
}

/// A created message with a titled embed that is not an enumerated failure
fn unknown_failure(message: &InboundMessage) -> Option<Classification> {
    let embed = message
        .embeds
        .iter()
        .find(|embed| !embed.title.trim().is_empty())?;
    let content_hash = embed.footer.as_deref().and_then(hash_from_failure_footer);
    Some(Classification::Failure {
        keys: failure_keys(message, content_hash.map(CorrelationKey::ByKeywordHash)),
        message_id: message.id.clone(),
        title: embed.title.clone(),
        description: embed.description.clone(),
        known: false,
    })
}

/// Lookup order: referenced origin, interaction, echoed content
fn failure_keys(
    message: &InboundMessage,
    content_key: Option<CorrelationKey>,
) -> Vec<CorrelationKey> {
    let mut keys = Vec::with_capacity(3);
    if let Some(referenced) = &message.referenced_message_id {
        keys.push(CorrelationKey::ByOriginMessageId(referenced.clone()));
    }
    if let Some(interaction) = &message.interaction {
        keys.push(CorrelationKey::ByInteractionId(interaction.id.clone()));
    }
    keys.extend(content_key);
    keys
}
