//! vibeflow.host_event.v1 schema definition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Mood, SubChange};

/// Current schema version
pub const SCHEMA_VERSION: &str = "vibeflow.host_event.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Kind of trigger carried by a host event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// One or more sub-changes to a document
    TextChange,
    /// Editor window gained or lost focus
    Focus,
    /// Periodic scoring tick
    Tick,
    /// User-invoked command
    Command,
    /// Answer to a pending prompt
    Decision,
    /// Dashboard confirmed it received a snapshot
    DashboardAck,
}

/// User-facing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ReportMood,
    ToggleAssist,
    LogAiReject,
    ExportLogs,
    OpenDashboard,
}

/// Event payload, shape depends on the kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    TextChange {
        changes: Vec<SubChange>,
    },
    Focus {
        focused: bool,
    },
    Command {
        command: Command,
        /// Mood already picked by the host (report_mood only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mood: Option<String>,
        /// Export destination (export_logs only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Decision {
        token: Uuid,
        /// Absent when the prompt was dismissed
        #[serde(default)]
        choice: Option<String>,
    },
}

/// The main vibeflow.host_event.v1 record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    /// Schema version identifier
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// When the host observed the trigger
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl HostEvent {
    fn with_payload(timestamp: DateTime<Utc>, kind: EventKind, payload: Option<Payload>) -> Self {
        HostEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            kind,
            payload,
        }
    }

    pub fn text_change(timestamp: DateTime<Utc>, changes: Vec<SubChange>) -> Self {
        Self::with_payload(timestamp, EventKind::TextChange, Some(Payload::TextChange { changes }))
    }

    pub fn focus(timestamp: DateTime<Utc>, focused: bool) -> Self {
        Self::with_payload(timestamp, EventKind::Focus, Some(Payload::Focus { focused }))
    }

    pub fn tick(timestamp: DateTime<Utc>) -> Self {
        Self::with_payload(timestamp, EventKind::Tick, None)
    }

    pub fn command(timestamp: DateTime<Utc>, command: Command) -> Self {
        Self::with_payload(
            timestamp,
            EventKind::Command,
            Some(Payload::Command {
                command,
                mood: None,
                path: None,
            }),
        )
    }

    pub fn report_mood(timestamp: DateTime<Utc>, mood: Mood) -> Self {
        Self::with_payload(
            timestamp,
            EventKind::Command,
            Some(Payload::Command {
                command: Command::ReportMood,
                mood: Some(mood.as_str().to_string()),
                path: None,
            }),
        )
    }

    pub fn export_logs(timestamp: DateTime<Utc>, path: impl Into<String>) -> Self {
        Self::with_payload(
            timestamp,
            EventKind::Command,
            Some(Payload::Command {
                command: Command::ExportLogs,
                mood: None,
                path: Some(path.into()),
            }),
        )
    }

    pub fn decision(timestamp: DateTime<Utc>, token: Uuid, choice: Option<String>) -> Self {
        Self::with_payload(timestamp, EventKind::Decision, Some(Payload::Decision { token, choice }))
    }

    pub fn dashboard_ack(timestamp: DateTime<Utc>) -> Self {
        Self::with_payload(timestamp, EventKind::DashboardAck, None)
    }

    /// Validate the event schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        match (&self.kind, &self.payload) {
            (EventKind::TextChange, Some(Payload::TextChange { .. })) => Ok(()),
            (EventKind::Focus, Some(Payload::Focus { .. })) => Ok(()),
            (EventKind::Tick, None) | (EventKind::DashboardAck, None) => Ok(()),
            (EventKind::Decision, Some(Payload::Decision { .. })) => Ok(()),
            (EventKind::Command, Some(Payload::Command { command, mood, path })) => {
                if let Some(raw) = mood {
                    raw.parse::<Mood>().map_err(ValidationError::InvalidMood)?;
                }
                if *command == Command::ExportLogs && path.as_deref().map_or(true, str::is_empty) {
                    return Err(ValidationError::MissingField("path".to_string()));
                }
                Ok(())
            }
            (kind, None) => Err(ValidationError::MissingPayload(format!("{:?}", kind))),
            (kind, Some(_)) => Err(ValidationError::PayloadKindMismatch {
                kind: format!("{:?}", kind),
                payload_type: self.payload_type_name(),
            }),
        }
    }

    fn payload_type_name(&self) -> String {
        match &self.payload {
            Some(Payload::TextChange { .. }) => "text_change".to_string(),
            Some(Payload::Focus { .. }) => "focus".to_string(),
            Some(Payload::Command { .. }) => "command".to_string(),
            Some(Payload::Decision { .. }) => "decision".to_string(),
            None => "none".to_string(),
        }
    }
}

/// Validation errors for host events
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Payload kind mismatch: kind is {kind} but payload is {payload_type}")]
    PayloadKindMismatch { kind: String, payload_type: String },

    #[error("Missing payload for {0}")]
    MissingPayload(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid mood: {0}")]
    InvalidMood(String),
}
