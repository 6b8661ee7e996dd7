//! Scripted collaborators for session tests.

#![allow(dead_code)]

use chatsh_core::{
    AskRequest, ChatSession, ChatshError, Console, InteractionLog, LanguageModel, RecordFormat,
    SessionOptions, ShellExecutor,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::cell::RefCell;
use std::collections::VecDeque;
use tempfile::TempDir;

/// One scripted backend reply.
pub enum Reply {
    Chunks(Vec<&'static str>),
    /// Yield the chunks, then fail.
    FailAfter(Vec<&'static str>, &'static str),
}

/// Backend that answers from a script and remembers every payload it saw.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<Reply>>,
    pub payloads: RefCell<Vec<String>>,
    pub models: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            ..Default::default()
        }
    }
}

impl LanguageModel for ScriptedBackend {
    fn ask<'a>(&'a self, request: AskRequest<'a>) -> BoxStream<'a, chatsh_core::Result<String>> {
        self.payloads.borrow_mut().push(request.payload.to_string());
        self.models.borrow_mut().push(request.model.to_string());

        let items: Vec<chatsh_core::Result<String>> = match self.replies.borrow_mut().pop_front() {
            Some(Reply::Chunks(chunks)) => chunks.into_iter().map(|c| Ok(c.to_string())).collect(),
            Some(Reply::FailAfter(chunks, message)) => chunks
                .into_iter()
                .map(|c| Ok(c.to_string()))
                .chain(std::iter::once(Err(ChatshError::Backend(message.to_string()))))
                .collect(),
            None => vec![Err(ChatshError::Backend("script exhausted".to_string()))],
        };
        stream::iter(items).boxed()
    }
}

/// Shell that returns a fixed output.
pub struct RecordingShell {
    output: String,
    pub commands: RefCell<Vec<String>>,
}

impl RecordingShell {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            commands: RefCell::new(Vec::new()),
        }
    }
}

impl ShellExecutor for RecordingShell {
    async fn execute(&self, command: &str) -> String {
        self.commands.borrow_mut().push(command.to_string());
        self.output.clone()
    }
}

/// Console that answers confirmations from a script.
#[derive(Default)]
pub struct ScriptedConsole {
    approvals: VecDeque<bool>,
    pub streamed: String,
    pub confirmations: Vec<String>,
    pub outputs: Vec<String>,
    pub notices: Vec<String>,
    pub errors: Vec<String>,
}

impl ScriptedConsole {
    pub fn approving(approvals: Vec<bool>) -> Self {
        Self {
            approvals: approvals.into(),
            ..Default::default()
        }
    }
}

impl Console for ScriptedConsole {
    fn response_chunk(&mut self, chunk: &str) {
        self.streamed.push_str(chunk);
    }

    async fn confirm_execution(&mut self, code: &str) -> bool {
        self.confirmations.push(code.to_string());
        self.approvals.pop_front().unwrap_or(false)
    }

    fn execution_output(&mut self, output: &str) {
        self.outputs.push(output.to_string());
    }

    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

/// Build a session writing a JSON array log into a fresh temp dir.
pub fn scripted_session(
    replies: Vec<Reply>,
    shell_output: &str,
) -> (ChatSession<ScriptedBackend, RecordingShell>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let log = InteractionLog::create(temp_dir.path(), RecordFormat::JsonArray).unwrap();
    let options = SessionOptions {
        system_prompt: "You are a shell assistant.".to_string(),
        ..Default::default()
    };
    let session = ChatSession::new(
        log,
        ScriptedBackend::new(replies),
        RecordingShell::new(shell_output),
        options,
    );
    (session, temp_dir)
}
