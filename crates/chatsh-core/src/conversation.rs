//! Rewindable conversation history.
//!
//! This is the "current view" of the conversation that is serialized into
//! every request. It can shrink through back commands; the interaction log
//! never does.

use crate::codeblocks::{extract_codeblocks, extract_last_codeblock};
use crate::{ChatshError, Result};
use chatsh_types::{ChatMessage, Role, Turn};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static BACK_COMMAND_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:b|back)(?:\s+([0-9]+))?$").unwrap());

/// Parse `b`, `back`, `b N` or `back N` (case-insensitive).
///
/// Returns the number of turn pairs to remove, or `None` when the text is not a
/// back command. A count too large to represent is saturated, which later
/// resolves to a no-op rewind.
pub fn parse_back_command(text: &str) -> Option<usize> {
    let caps = BACK_COMMAND_REGEX.captures(text.trim())?;
    match caps.get(1) {
        Some(count) => Some(count.as_str().parse().unwrap_or(usize::MAX)),
        None => Some(1),
    }
}

/// Ordered list of visible turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    entries: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn add_entry(
        &mut self,
        role: Role,
        content: impl Into<String>,
        execution_output: Option<String>,
    ) {
        self.entries.push(Turn {
            execution_output,
            ..Turn::new(role, content)
        });
    }

    /// Attach execution output to the most recent turn.
    ///
    /// Returns false when the history is empty.
    pub fn attach_execution_output(&mut self, output: impl Into<String>) -> bool {
        match self.entries.last_mut() {
            Some(turn) => {
                turn.execution_output = Some(output.into());
                true
            }
            None => false,
        }
    }

    /// Remove the last turn if it is an unanswered user turn.
    pub fn discard_pending_user_turn(&mut self) -> Option<Turn> {
        match self.entries.last() {
            Some(turn) if turn.role == Role::User => self.entries.pop(),
            _ => None,
        }
    }

    /// Rewind if `text` is a back command.
    ///
    /// Returns the removed turns; empty when the text is not a back command or
    /// when nothing was removed.
    pub fn handle_back_command(&mut self, text: &str) -> Result<Vec<Turn>> {
        match parse_back_command(text) {
            Some(pairs) => self.back(pairs),
            None => Ok(Vec::new()),
        }
    }

    /// Remove the last `pairs` user/assistant pairs.
    ///
    /// Fails with [`ChatshError::NothingToRewind`] unless the last turn is an
    /// assistant turn. Zero pairs, or more pairs than the history holds, is a
    /// no-op returning an empty list.
    pub fn back(&mut self, pairs: usize) -> Result<Vec<Turn>> {
        if !matches!(self.entries.last(), Some(turn) if turn.role == Role::Assistant) {
            return Err(ChatshError::NothingToRewind);
        }

        let count = match pairs.checked_mul(2) {
            Some(count) if count > 0 && count <= self.entries.len() => count,
            _ => {
                debug!(
                    target: "chatsh::session",
                    "Ignoring rewind of {} pairs over {} turns",
                    pairs,
                    self.entries.len()
                );
                return Ok(Vec::new());
            }
        };

        let removed = self.entries.split_off(self.entries.len() - count);
        debug!(
            target: "chatsh::session",
            "Rewound {} turns, {} remain",
            removed.len(),
            self.entries.len()
        );
        Ok(removed)
    }

    /// `{role, content}` pairs for backends that keep their own session.
    pub fn get_chat_messages(&self) -> Vec<ChatMessage> {
        self.entries.iter().map(ChatMessage::from).collect()
    }

    /// Full stateless context: the system prompt followed by every turn.
    ///
    /// Execution output is inlined as a `<SYSTEM>` block right after the turn
    /// it belongs to.
    pub fn construct_full_message(&self, system_prompt: &str) -> String {
        let mut blocks = Vec::with_capacity(self.entries.len());
        for turn in &self.entries {
            let tag = turn.role.payload_tag();
            blocks.push(format!("<{tag}>\n{}\n</{tag}>", turn.content));
            if let Some(output) = turn.execution_output.as_deref().filter(|o| !o.is_empty()) {
                blocks.push(format!("<SYSTEM>\n{}\n</SYSTEM>", output.trim()));
            }
        }

        format!("{system_prompt}\n\n{}", blocks.join("\n"))
    }

    /// Shell blocks from the most recent assistant turn.
    ///
    /// With `last_only`, only the final block of that turn is returned.
    pub fn extract_codeblocks(&self, last_only: bool) -> Vec<String> {
        let Some(turn) = self.last_assistant_turn() else {
            return Vec::new();
        };

        if last_only {
            extract_last_codeblock(&turn.content).into_iter().collect()
        } else {
            extract_codeblocks(&turn.content)
        }
    }

    pub fn entries(&self) -> &[Turn] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Turn> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn last_assistant_turn(&self) -> Option<&Turn> {
        self.entries.iter().rev().find(|turn| turn.role == Role::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn history_with_pairs(pairs: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..pairs {
            history.add_entry(Role::User, format!("question {i}"), None);
            history.add_entry(Role::Assistant, format!("answer {i}"), None);
        }
        history
    }

    #[test]
    fn test_parse_back_command() {
        assert_eq!(parse_back_command("b"), Some(1));
        assert_eq!(parse_back_command("back"), Some(1));
        assert_eq!(parse_back_command("BACK 3"), Some(3));
        assert_eq!(parse_back_command("  b   2  "), Some(2));
        assert_eq!(parse_back_command("b 0"), Some(0));
        assert_eq!(parse_back_command("backup"), None);
        assert_eq!(parse_back_command("back two"), None);
        assert_eq!(parse_back_command("b -1"), None);
        assert_eq!(parse_back_command("go back 1"), None);
        assert_eq!(parse_back_command("b 99999999999999999999999"), Some(usize::MAX));
    }

    #[test]
    fn test_back_removes_last_pairs() {
        let mut history = history_with_pairs(3);
        let removed = history.back(2).unwrap();

        assert_eq!(removed.len(), 4);
        assert_eq!(removed[0].content, "question 1");
        assert_eq!(removed[3].content, "answer 2");
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].content, "question 0");
        assert_eq!(history.entries()[1].content, "answer 0");
    }

    #[test]
    fn test_back_out_of_range_is_noop() {
        let mut history = history_with_pairs(2);
        assert!(history.back(0).unwrap().is_empty());
        assert!(history.back(3).unwrap().is_empty());
        assert!(history.back(usize::MAX).unwrap().is_empty());
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_back_requires_assistant_tail() {
        let mut history = ConversationHistory::new();
        assert!(matches!(history.back(1), Err(ChatshError::NothingToRewind)));

        history.add_entry(Role::User, "pending", None);
        assert!(matches!(history.back(1), Err(ChatshError::NothingToRewind)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_handle_back_command() {
        let mut history = history_with_pairs(2);
        assert!(history.handle_back_command("hello").unwrap().is_empty());
        assert_eq!(history.len(), 4);

        let removed = history.handle_back_command("b").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_get_chat_messages() {
        let history = history_with_pairs(1);
        let messages = history.get_chat_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "answer 0");
    }

    #[test]
    fn test_construct_full_message() {
        let mut history = ConversationHistory::new();
        history.add_entry(Role::User, "list files", None);
        history.add_entry(Role::Assistant, "```sh\nls\n```", Some("a.txt\nb.txt\n".into()));

        let message = history.construct_full_message("SYS");
        assert_eq!(
            message,
            "SYS\n\n<USER>\nlist files\n</USER>\n<ASSISTANT>\n```sh\nls\n```\n</ASSISTANT>\n<SYSTEM>\na.txt\nb.txt\n</SYSTEM>"
        );
    }

    #[test]
    fn test_construct_full_message_skips_empty_output() {
        let mut history = ConversationHistory::new();
        history.add_entry(Role::User, "hi", Some(String::new()));
        assert_eq!(history.construct_full_message("S"), "S\n\n<USER>\nhi\n</USER>");
    }

    #[test]
    fn test_extract_codeblocks_uses_latest_assistant_turn() {
        let mut history = ConversationHistory::new();
        history.add_entry(Role::Assistant, "```sh\nold\n```", None);
        history.add_entry(Role::User, "again", None);
        history.add_entry(Role::Assistant, "```sh\none\n```\n```sh\ntwo\n```", None);

        assert_eq!(history.extract_codeblocks(false), vec!["one", "two"]);
        assert_eq!(history.extract_codeblocks(true), vec!["two"]);
    }

    #[test]
    fn test_discard_pending_user_turn() {
        let mut history = history_with_pairs(1);
        assert!(history.discard_pending_user_turn().is_none());
        history.add_entry(Role::User, "unanswered", None);
        assert_eq!(history.discard_pending_user_turn().unwrap().content, "unanswered");
        assert_eq!(history.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_back_removes_exactly_two_per_pair(k in 1usize..12, p in 0usize..16) {
            let mut history = history_with_pairs(k);
            let before: Vec<Turn> = history.entries().to_vec();
            let removed = history.back(p).unwrap();

            if p >= 1 && p <= k {
                prop_assert_eq!(removed.len(), 2 * p);
                prop_assert_eq!(history.entries(), &before[..before.len() - 2 * p]);
                prop_assert_eq!(&removed[..], &before[before.len() - 2 * p..]);
            } else {
                prop_assert!(removed.is_empty());
                prop_assert_eq!(history.entries(), &before[..]);
            }
        }
    }
}
