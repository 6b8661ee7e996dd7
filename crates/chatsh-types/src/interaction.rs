//! Interaction ledger types.
//!
//! An [`Interaction`] is one immutable, durably logged event. Interactions are
//! linked to the event that caused them through `parent_id`, which always
//! references a smaller id.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Open, string-keyed metadata attached to an interaction.
pub type Metadata = Map<String, Value>;

/// Kind of event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Text submitted by the user.
    UserMessage,
    /// Complete response streamed back from the model.
    LlmResponse,
    /// Shell code extracted from a response and offered for execution.
    CodeExecutionPrompt,
    /// Whether the user accepted or skipped execution.
    CodeExecutionDecision,
    /// Combined stdout/stderr of an execution.
    CodeExecutionOutput,
    /// Conversation rewind.
    BackCommand,
    /// End of the session.
    ExitCommand,
    /// Recoverable failure surfaced to the user.
    Error,
    /// Notice generated by the tool itself.
    SystemMessage,
}

impl InteractionType {
    pub const ALL: [InteractionType; 9] = [
        InteractionType::UserMessage,
        InteractionType::LlmResponse,
        InteractionType::CodeExecutionPrompt,
        InteractionType::CodeExecutionDecision,
        InteractionType::CodeExecutionOutput,
        InteractionType::BackCommand,
        InteractionType::ExitCommand,
        InteractionType::Error,
        InteractionType::SystemMessage,
    ];

    /// Stable tag written to disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::UserMessage => "user_message",
            InteractionType::LlmResponse => "llm_response",
            InteractionType::CodeExecutionPrompt => "code_execution_prompt",
            InteractionType::CodeExecutionDecision => "code_execution_decision",
            InteractionType::CodeExecutionOutput => "code_execution_output",
            InteractionType::BackCommand => "back_command",
            InteractionType::ExitCommand => "exit_command",
            InteractionType::Error => "error",
            InteractionType::SystemMessage => "system_message",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown interaction type: '{0}'")]
pub struct ParseInteractionTypeError(pub String);

impl FromStr for InteractionType {
    type Err = ParseInteractionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InteractionType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseInteractionTypeError(s.to_string()))
    }
}

/// A single logged event.
///
/// Field order matches the on-disk record layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub parent_id: Option<u64>,
    pub interaction_id: u64,
}

impl Interaction {
    pub fn new(
        interaction_id: u64,
        kind: InteractionType,
        content: impl Into<String>,
        metadata: Metadata,
        parent_id: Option<u64>,
    ) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
            parent_id,
            interaction_id,
        }
    }

    /// True when this interaction starts a branch.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Accept RFC 3339 timestamps, or naive ISO-8601 ones read as local time.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
