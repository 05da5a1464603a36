use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sender value used when the inbound payload omits `sender`.
pub const NULL_SENDER: &str = "NULL";

/// Inbound command payload as published by the mobile app / device fleet.
///
/// Every field is optional on the wire so that "absent" stays distinct from
/// a present zero value (`{"command":0}` is a valid, unknown command).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Command code. Mandatory for dispatch; absence rejects the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<i64>,
    /// One-time password blob. Carried through, never interpreted here.
    #[serde(default, rename = "otp-auth", skip_serializing_if = "Option::is_none")]
    pub otp_auth: Option<String>,
    /// Identifier of the originating user or device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// Why an inbound message produced no Command Record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("payload is not a command object: {0}")]
    Malformed(String),

    #[error("payload has no command field")]
    MissingCommand,
}

impl CommandPayload {
    /// Decode a raw MQTT payload.
    pub fn parse(bytes: &[u8]) -> Result<Self, RejectReason> {
        serde_json::from_slice(bytes).map_err(|e| RejectReason::Malformed(e.to_string()))
    }

    /// Validate and classify, producing the record a dispatch cycle works on.
    pub fn into_record(self) -> Result<CommandRecord, RejectReason> {
        let code = self.command.ok_or(RejectReason::MissingCommand)?;
        let Classification { kind, label } = classify(code);
        Ok(CommandRecord {
            code,
            kind,
            label,
            sender: self.sender.unwrap_or_else(|| NULL_SENDER.to_string()),
            otp_present: self.otp_auth.is_some(),
        })
    }
}

/// Symbolic kind of a command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Open,
    Stop,
    Close,
    /// Open, then close after the device's hold time.
    Auto,
    /// Ask the device for an immediate status report.
    Report,
    Unknown,
}

/// Result of classifying a command code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: CommandKind,
    pub label: String,
}

/// Known codes. Anything not listed classifies as `Unknown`.
const COMMAND_TABLE: &[(i64, CommandKind, &str)] = &[
    (1, CommandKind::Open, "open"),
    (2, CommandKind::Stop, "stop"),
    (3, CommandKind::Close, "close"),
    (4, CommandKind::Auto, "auto"),
    (5, CommandKind::Report, "report"),
];

/// Map a command code to its kind and label.
///
/// Total over `i64`: unknown codes get `CommandKind::Unknown` and the
/// decimal code as their label.
pub fn classify(code: i64) -> Classification {
    match COMMAND_TABLE.iter().find(|(known, ..)| *known == code) {
        Some(&(_, kind, label)) => Classification {
            kind,
            label: label.to_string(),
        },
        None => Classification {
            kind: CommandKind::Unknown,
            label: code.to_string(),
        },
    }
}

/// A validated, classified command. Lives for one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub code: i64,
    pub kind: CommandKind,
    pub label: String,
    /// Sender, or [`NULL_SENDER`] when the payload had none.
    pub sender: String,
    pub otp_present: bool,
}
