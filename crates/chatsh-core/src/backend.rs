//! Language model collaborator interface.
//!
//! The vendor protocol lives outside this crate. A backend receives the full
//! context payload for each request and yields the response as a lazy stream
//! of text chunks that can be consumed once.

use crate::Result;
use futures::stream::BoxStream;

/// Everything a backend needs to answer one round.
#[derive(Debug, Clone, Copy)]
pub struct AskRequest<'a> {
    /// Serialized conversation, see `ConversationHistory::construct_full_message`.
    pub payload: &'a str,
    pub system_prompt: &'a str,
    pub model: &'a str,
    pub max_tokens: u32,
    /// Whether the system prompt may be cached by the vendor.
    pub cacheable: bool,
}

pub trait LanguageModel {
    /// Start a request. Errors may surface at any point of the stream.
    fn ask<'a>(&'a self, request: AskRequest<'a>) -> BoxStream<'a, Result<String>>;
}
