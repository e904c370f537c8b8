//! # Interaction Payloads
//!
//! Wire bodies for the upstream interaction endpoint. Slash commands
//! (`imagine`, `describe`, `fast`, `relax`) are application-command
//! interactions that embed the command definition fetched from the catalog;
//! upscales are component interactions against the origin message.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::constants::wire;

/// Application command definition as returned by the upstream catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCommand {
    pub id: String,
    pub application_id: String,
    pub version: String,
    pub name: String,
    #[serde(rename = "type", default = "default_command_type")]
    pub kind: u8,
    /// Remaining fields are carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_command_type() -> u8 {
    1
}

impl ApplicationCommand {
    pub fn new(
        id: impl Into<String>,
        application_id: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            application_id: application_id.into(),
            version: version.into(),
            name: name.into(),
            kind: default_command_type(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Commands of one worker keyed by name
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    commands: HashMap<String, ApplicationCommand>,
}

impl CommandCatalog {
    pub fn new(commands: Vec<ApplicationCommand>) -> Self {
        Self {
            commands: commands
                .into_iter()
                .map(|command| (command.name.clone(), command))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ApplicationCommand> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Identity fields shared by every payload a worker sends
#[derive(Debug, Clone)]
pub struct PayloadContext {
    pub application_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub session_id: String,
}

impl From<&WorkerConfig> for PayloadContext {
    fn from(worker: &WorkerConfig) -> Self {
        Self {
            application_id: worker.application_id.clone(),
            channel_id: worker.channel_id.clone(),
            guild_id: worker.guild_id.clone(),
            session_id: worker.session_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOption {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
    pub uploaded_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionData {
    pub version: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub options: Vec<CommandOption>,
    pub application_command: ApplicationCommand,
    pub attachments: Vec<AttachmentRef>,
}

/// Application-command interaction (type 2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    #[serde(rename = "type")]
    pub kind: u8,
    pub application_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    pub session_id: String,
    pub data: InteractionData,
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentData {
    pub component_type: u8,
    pub custom_id: String,
}

/// Message-component interaction (type 3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentInteraction {
    #[serde(rename = "type")]
    pub kind: u8,
    pub application_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    pub session_id: String,
    pub message_flags: u8,
    pub message_id: String,
    pub data: ComponentData,
    pub nonce: String,
}

fn nonce() -> String {
    rand::thread_rng()
        .gen_range(1_000_000_000_000_000_000u64..u64::MAX)
        .to_string()
}

fn application_command(
    context: &PayloadContext,
    command: &ApplicationCommand,
    options: Vec<CommandOption>,
    attachments: Vec<AttachmentRef>,
) -> InteractionRequest {
    InteractionRequest {
        kind: wire::INTERACTION_APPLICATION_COMMAND,
        application_id: command.application_id.clone(),
        channel_id: context.channel_id.clone(),
        guild_id: context.guild_id.clone(),
        session_id: context.session_id.clone(),
        data: InteractionData {
            version: command.version.clone(),
            id: command.id.clone(),
            name: command.name.clone(),
            kind: command.kind,
            options,
            application_command: command.clone(),
            attachments,
        },
        nonce: nonce(),
    }
}

pub fn imagine(
    context: &PayloadContext,
    command: &ApplicationCommand,
    prompt: &str,
) -> InteractionRequest {
    let option = CommandOption {
        kind: wire::OPTION_STRING,
        name: "prompt".to_string(),
        value: Value::String(prompt.to_string()),
    };
    application_command(context, command, vec![option], Vec::new())
}

/// Describe command referencing a previously uploaded attachment
pub fn describe(
    context: &PayloadContext,
    command: &ApplicationCommand,
    filename: &str,
    uploaded_filename: &str,
) -> InteractionRequest {
    let option = CommandOption {
        kind: wire::OPTION_ATTACHMENT,
        name: "image".to_string(),
        value: Value::from(0),
    };
    let attachment = AttachmentRef {
        id: wire::DESCRIBE_ATTACHMENT_SLOT.to_string(),
        filename: filename.to_string(),
        uploaded_filename: uploaded_filename.to_string(),
    };
    application_command(context, command, vec![option], vec![attachment])
}

pub fn switch_mode(context: &PayloadContext, command: &ApplicationCommand) -> InteractionRequest {
    application_command(context, command, Vec::new(), Vec::new())
}

pub fn upscale(
    context: &PayloadContext,
    index: u8,
    artifact_id: &str,
    origin_message_id: &str,
) -> ComponentInteraction {
    ComponentInteraction {
        kind: wire::INTERACTION_MESSAGE_COMPONENT,
        application_id: context.application_id.clone(),
        channel_id: context.channel_id.clone(),
        guild_id: context.guild_id.clone(),
        session_id: context.session_id.clone(),
        message_flags: 0,
        message_id: origin_message_id.to_string(),
        data: ComponentData {
            component_type: wire::COMPONENT_BUTTON,
            custom_id: wire::upsample_custom_id(index, artifact_id),
        },
        nonce: nonce(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PayloadContext {
        PayloadContext {
            application_id: "app-1".to_string(),
            channel_id: "chan-1".to_string(),
            guild_id: Some("guild-1".to_string()),
            session_id: "session-1".to_string(),
        }
    }

    #[test]
    fn test_imagine_payload_shape() {
        let command = ApplicationCommand::new("cmd-1", "app-1", "v7", "imagine");
        let body = serde_json::to_value(imagine(&context(), &command, "a cat --seed 3")).unwrap();

        assert_eq!(body["type"], 2);
        assert_eq!(body["channel_id"], "chan-1");
        assert_eq!(body["guild_id"], "guild-1");
        assert_eq!(body["data"]["name"], "imagine");
        assert_eq!(body["data"]["version"], "v7");
        assert_eq!(body["data"]["options"][0]["type"], 3);
        assert_eq!(body["data"]["options"][0]["value"], "a cat --seed 3");
        assert_eq!(body["data"]["application_command"]["id"], "cmd-1");
        assert!(!body["nonce"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_upscale_payload_shape() {
        let body = serde_json::to_value(upscale(&context(), 3, "uuid-1", "msg-9")).unwrap();

        assert_eq!(body["type"], 3);
        assert_eq!(body["message_id"], "msg-9");
        assert_eq!(body["message_flags"], 0);
        assert_eq!(body["data"]["component_type"], 2);
        assert_eq!(body["data"]["custom_id"], "MJ::JOB::upsample::3::uuid-1");
    }

    #[test]
    fn test_describe_references_uploaded_attachment() {
        let command = ApplicationCommand::new("cmd-2", "app-1", "v1", "describe");
        let body = serde_json::to_value(describe(
            &context(),
            &command,
            "photo.png",
            "uploads/abc/photo.png",
        ))
        .unwrap();

        assert_eq!(body["data"]["options"][0]["type"], 11);
        assert_eq!(body["data"]["options"][0]["value"], 0);
        assert_eq!(body["data"]["attachments"][0]["id"], "0");
        assert_eq!(
            body["data"]["attachments"][0]["uploaded_filename"],
            "uploads/abc/photo.png"
        );
    }

    #[test]
    fn test_catalog_keeps_unknown_fields() {
        let raw = r#"[{"id":"1","application_id":"a","version":"v","name":"fast","type":1,"description":"Switch to fast mode"}]"#;
        let commands: Vec<ApplicationCommand> = serde_json::from_str(raw).unwrap();
        let catalog = CommandCatalog::new(commands);

        let fast = catalog.get("fast").unwrap();
        assert_eq!(fast.extra["description"], "Switch to fast mode");
        assert!(catalog.get("relax").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
