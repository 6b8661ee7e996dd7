//! Conversation state and durable interaction log for chatsh.

pub mod backend;
pub mod codeblocks;
mod conversation;
mod error;
mod interaction_log;
pub mod session;
pub mod shell;
mod transcript;

pub use backend::{AskRequest, LanguageModel};
pub use codeblocks::extract_codeblocks;
pub use conversation::{parse_back_command, ConversationHistory};
pub use error::ChatshError;
pub use interaction_log::{InteractionLog, RecordFormat};
pub use session::{ChatSession, Console, RoundOutcome, SessionOptions};
pub use shell::{ProcessShell, ShellExecutor};
pub use transcript::Transcript;

/// Result type for chatsh operations.
pub type Result<T> = std::result::Result<T, ChatshError>;
