//! Interactive round driver.
//!
//! A `ChatSession` owns the visible history and the interaction log and keeps
//! them consistent. Every user input is one round: the raw text is classified
//! (exit phrase, back command or message), the model is asked, proposed shell
//! commands are confirmed and run, and each step lands in the log with its
//! causal parent.
//!
//! Only fatal log errors escape `handle_input`. Vendor failures are recorded
//! and reported, and the session keeps going.

use crate::backend::{AskRequest, LanguageModel};
use crate::conversation::{parse_back_command, ConversationHistory};
use crate::interaction_log::InteractionLog;
use crate::shell::ShellExecutor;
use crate::transcript::Transcript;
use crate::{ChatshError, Result};
use chatsh_types::{Role, Turn};
use futures::StreamExt;
use tracing::{debug, info, warn};

/// Output stored on the turn when the user declines to run a command.
pub const SKIPPED_OUTPUT: &str = "Command skipped.\n";

const GOOD_BOT_FAREWELL: &str = "Thank you for the compliment! See you next time.";
const BAD_BOT_FAREWELL: &str = "I'm sorry to hear that. The conversation has ended.";

/// Per-request model settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub cacheable: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            model: "s".to_string(),
            max_tokens: 8192,
            cacheable: true,
        }
    }
}

/// What a single call to `handle_input` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Blank input.
    Ignored,
    /// The model answered. `executed` is `None` when no command was proposed.
    Answered {
        response_id: u64,
        executed: Option<bool>,
    },
    /// A back command removed these turns (possibly none).
    Rewound(Vec<Turn>),
    /// A back command arrived while the last turn was not an assistant turn.
    NothingToRewind,
    /// The backend failed; the message was recorded as an error interaction.
    Failed(String),
    /// The user ended the session with an exit phrase.
    Exit,
}

/// User-facing side of a session.
#[allow(async_fn_in_trait)]
pub trait Console {
    /// A piece of the streaming model response.
    fn response_chunk(&mut self, chunk: &str);

    /// The model response is complete.
    fn response_done(&mut self) {}

    /// Ask whether `code` may be executed.
    async fn confirm_execution(&mut self, code: &str) -> bool;

    fn execution_output(&mut self, output: &str);

    fn notice(&mut self, message: &str);

    fn error(&mut self, message: &str);
}

pub struct ChatSession<B, S> {
    history: ConversationHistory,
    log: InteractionLog,
    transcript: Option<Transcript>,
    backend: B,
    shell: S,
    options: SessionOptions,
    exited: bool,
}

impl<B: LanguageModel, S: ShellExecutor> ChatSession<B, S> {
    pub fn new(log: InteractionLog, backend: B, shell: S, options: SessionOptions) -> Self {
        info!(
            target: "chatsh::session",
            "Starting session with model {} logging to {}",
            options.model,
            log.path().display()
        );
        Self {
            history: ConversationHistory::new(),
            log,
            transcript: None,
            backend,
            shell,
            options,
            exited: false,
        }
    }

    /// Mirror the visible conversation into a plain-text transcript.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Process one line of user input.
    pub async fn handle_input<C: Console>(
        &mut self,
        input: &str,
        console: &mut C,
    ) -> Result<RoundOutcome> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(RoundOutcome::Ignored);
        }

        let lowered = text.to_lowercase();
        if lowered.starts_with("good bot") || lowered.starts_with("bad bot") {
            return self.exit_with(text, lowered.starts_with("good bot"), console);
        }

        if let Some(pairs) = parse_back_command(text) {
            return self.rewind(pairs, console);
        }

        self.run_round(input, console).await
    }

    /// Record the end of the session unless an exit phrase already did.
    ///
    /// The active conversation is discarded either way; only the ledger outlives
    /// the session.
    pub fn finish(&mut self) -> Result<()> {
        self.history.clear();
        if self.exited {
            return Ok(());
        }
        self.exited = true;
        self.log.record_exit("end of input")?;
        info!(target: "chatsh::session", "Session ended after {} interactions", self.log.len());
        Ok(())
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn log(&self) -> &InteractionLog {
        &self.log
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    fn exit_with<C: Console>(
        &mut self,
        text: &str,
        good: bool,
        console: &mut C,
    ) -> Result<RoundOutcome> {
        self.transcribe("USER", text);
        self.log.record_exit(text)?;
        self.exited = true;
        self.history.clear();

        let farewell = if good { GOOD_BOT_FAREWELL } else { BAD_BOT_FAREWELL };
        console.notice(farewell);
        self.transcribe("SYSTEM", farewell);
        info!(target: "chatsh::session", "Session ended by user: {}", text);
        Ok(RoundOutcome::Exit)
    }

    fn rewind<C: Console>(&mut self, pairs: usize, console: &mut C) -> Result<RoundOutcome> {
        match self.history.back(pairs) {
            Ok(removed) => {
                self.log.record_back_command(pairs, removed.len())?;
                let notice = format!("<< Removed {} most recent message pairs >>", removed.len() / 2);
                console.notice(&notice);
                self.transcribe("SYSTEM", &notice);
                Ok(RoundOutcome::Rewound(removed))
            }
            Err(ChatshError::NothingToRewind) => {
                debug!(target: "chatsh::session", "Back command ignored, last turn is not an answer");
                console.notice("Nothing to rewind.");
                Ok(RoundOutcome::NothingToRewind)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_round<C: Console>(&mut self, input: &str, console: &mut C) -> Result<RoundOutcome> {
        self.history.add_entry(Role::User, input, None);
        let user_id = self.log.record_user_message(input)?;
        self.transcribe("USER", input);

        let payload = self
            .history
            .construct_full_message(&self.options.system_prompt);
        let request = AskRequest {
            payload: &payload,
            system_prompt: &self.options.system_prompt,
            model: &self.options.model,
            max_tokens: self.options.max_tokens,
            cacheable: self.options.cacheable,
        };

        let response = match collect_response(&self.backend, request, console).await {
            Ok(response) => response,
            Err(e) if !e.is_fatal() => {
                let message = e.to_string();
                warn!(target: "chatsh::backend", "Request for interaction {} failed: {}", user_id, message);
                self.history.discard_pending_user_turn();
                self.log.record_error(&message, Some(user_id))?;
                console.error(&message);
                self.transcribe("ERROR", &message);
                return Ok(RoundOutcome::Failed(message));
            }
            Err(e) => return Err(e),
        };

        self.history.add_entry(Role::Assistant, response.as_str(), None);
        let response_id = self.log.record_llm_response(&response, user_id)?;
        self.transcribe("ASSISTANT", &response);

        let blocks = self.history.extract_codeblocks(false);
        if blocks.is_empty() {
            return Ok(RoundOutcome::Answered {
                response_id,
                executed: None,
            });
        }

        let command = blocks.join("\n");
        let prompt_id = self.log.record_code_execution_prompt(&command, response_id)?;
        let approved = console.confirm_execution(&command).await;
        self.log.record_code_execution_decision(approved, prompt_id)?;

        let output = if approved {
            let output = self.shell.execute(&command).await;
            self.log.record_code_execution_output(&output, prompt_id)?;
            console.execution_output(&output);
            output
        } else {
            debug!(target: "chatsh::session", "Execution of interaction {} declined", prompt_id);
            console.notice("Execution skipped.");
            SKIPPED_OUTPUT.to_string()
        };
        self.transcribe("SYSTEM", &output);
        self.history.attach_execution_output(output);

        Ok(RoundOutcome::Answered {
            response_id,
            executed: Some(approved),
        })
    }

    fn transcribe(&mut self, tag: &str, message: &str) {
        if let Some(transcript) = self.transcript.as_mut() {
            if let Err(e) = transcript.append(tag, message) {
                warn!(
                    target: "chatsh::session",
                    "Failed to write transcript {}: {}",
                    transcript.path().display(),
                    e
                );
            }
        }
    }
}

async fn collect_response<B: LanguageModel, C: Console>(
    backend: &B,
    request: AskRequest<'_>,
    console: &mut C,
) -> Result<String> {
    let mut stream = backend.ask(request);
    let mut response = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        console.response_chunk(&chunk);
        response.push_str(&chunk);
    }
    console.response_done();
    Ok(response)
}
