//! Builders for inbound gateway events shaped like the upstream service's
//! messages.

#![allow(dead_code)]

use uuid::Uuid;

use imagine_bridge::events::{Attachment, Embed, GatewayEvent, InboundMessage, InteractionRef};

const MENTION: &str = "<@1014853171543822356>";

/// Attachment URL with a fresh artifact identifier
pub fn artifact_url() -> String {
    format!(
        "https://cdn.example.com/attachments/1100/2200/bridge_{}.png",
        Uuid::new_v4()
    )
}

/// Artifact identifier embedded in a URL built by [`artifact_url`]
pub fn artifact_id(url: &str) -> String {
    let stem = url.trim_end_matches(".png");
    stem[stem.len() - 36..].to_string()
}

fn attachment(url: &str) -> Attachment {
    Attachment {
        url: url.to_string(),
        filename: "grid.png".to_string(),
    }
}

/// Four-variant grid echoing the prompt as it was sent
pub fn origin_event(message_id: &str, prompt: &str, url: &str) -> GatewayEvent {
    GatewayEvent::MessageCreate(InboundMessage {
        id: message_id.to_string(),
        content: format!("**{prompt}** - {MENTION} (fast)"),
        attachments: vec![attachment(url)],
        ..InboundMessage::default()
    })
}

/// Upscaled variant replying to its origin grid
pub fn derived_event(
    message_id: &str,
    origin_message_id: &str,
    prompt: &str,
    index: u8,
    url: &str,
) -> GatewayEvent {
    GatewayEvent::MessageCreate(InboundMessage {
        id: message_id.to_string(),
        content: format!("**{prompt}** - Image #{index} {MENTION}"),
        attachments: vec![attachment(url)],
        referenced_message_id: Some(origin_message_id.to_string()),
        ..InboundMessage::default()
    })
}

/// Failure notice whose footer echoes the submitted command
pub fn failure_event(message_id: &str, title: &str, description: &str, prompt: &str) -> GatewayEvent {
    GatewayEvent::MessageCreate(InboundMessage {
        id: message_id.to_string(),
        embeds: vec![Embed {
            title: title.to_string(),
            description: description.to_string(),
            footer: Some(format!("/imagine {prompt}")),
        }],
        ..InboundMessage::default()
    })
}

/// Failure notice replying to an origin grid
pub fn reply_failure_event(
    message_id: &str,
    title: &str,
    description: &str,
    origin_message_id: &str,
) -> GatewayEvent {
    GatewayEvent::MessageCreate(InboundMessage {
        id: message_id.to_string(),
        embeds: vec![Embed {
            title: title.to_string(),
            description: description.to_string(),
            footer: None,
        }],
        referenced_message_id: Some(origin_message_id.to_string()),
        ..InboundMessage::default()
    })
}

/// In-place edit of a progress message into a failure
pub fn update_failure_event(message_id: &str, title: &str, prompt: &str) -> GatewayEvent {
    GatewayEvent::MessageUpdate(InboundMessage {
        id: message_id.to_string(),
        content: format!("**{prompt}** - {MENTION} (Stopped)"),
        embeds: vec![Embed {
            title: title.to_string(),
            description: String::new(),
            footer: None,
        }],
        ..InboundMessage::default()
    })
}

/// Describe result edited into the interaction's reply message
pub fn describe_reply_event(message_id: &str, interaction_id: &str, description: &str) -> GatewayEvent {
    GatewayEvent::MessageUpdate(InboundMessage {
        id: message_id.to_string(),
        embeds: vec![Embed {
            title: String::new(),
            description: description.to_string(),
            footer: None,
        }],
        interaction: Some(InteractionRef {
            id: interaction_id.to_string(),
            name: "describe".to_string(),
        }),
        ..InboundMessage::default()
    })
}

pub fn announcement(interaction_id: &str, command_name: &str) -> GatewayEvent {
    GatewayEvent::InteractionAnnounced {
        interaction_id: interaction_id.to_string(),
        command_name: command_name.to_string(),
    }
}
