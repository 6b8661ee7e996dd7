//! Error types for chatsh.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatshError {
    #[error("Failed to append to interaction log {path}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interaction log {path} is corrupt: {reason}")]
    CorruptLog { path: PathBuf, reason: String },

    #[error("Interaction log was loaded for inspection and cannot be written")]
    ReadOnlyLog,

    #[error("Invalid interaction log file {path}: {reason}")]
    InvalidLogFile { path: PathBuf, reason: String },

    #[error("Parent id {parent_id} must be smaller than interaction id {id}")]
    InvalidParent { id: u64, parent_id: u64 },

    #[error("Interaction not found: {0}")]
    UnknownInteraction(u64),

    #[error("Nothing to rewind: the last turn is not an assistant response")]
    NothingToRewind,

    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatshError {
    /// Errors that leave the audit trail unverifiable and must end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LogWrite { .. } | Self::CorruptLog { .. })
    }
}
