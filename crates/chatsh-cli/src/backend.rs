//! Model backend that delegates to an external command.
//!
//! The command receives the serialized conversation on stdin and the model
//! settings in `CHATSH_*` environment variables. Whatever it prints on stdout
//! is the response, streamed line by line as it arrives and byte for byte as
//! printed, so a final line without a newline stays that way.

use chatsh_core::{AskRequest, ChatshError, LanguageModel};
use futures::stream::{self, BoxStream, StreamExt};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn spawn(&self, request: &AskRequest<'_>) -> chatsh_core::Result<Running> {
        debug!(
            target: "chatsh::backend",
            "Spawning {} for model {} ({} payload bytes)",
            self.program,
            request.model,
            request.payload.len()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("CHATSH_MODEL", request.model)
            .env("CHATSH_MAX_TOKENS", request.max_tokens.to_string())
            .env("CHATSH_CACHEABLE", if request.cacheable { "1" } else { "0" })
            .env("CHATSH_SYSTEM_PROMPT", request.system_prompt)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChatshError::Backend(format!("failed to start {}: {}", self.program, e)))?;

        let (Some(mut stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ChatshError::Backend(format!(
                "{} was started without pipes",
                self.program
            )));
        };

        let payload = request.payload.to_string();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                debug!(target: "chatsh::backend", "Model command closed stdin early: {}", e);
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            if let Err(e) = stderr.read_to_string(&mut text).await {
                debug!(target: "chatsh::backend", "Failed to read model stderr: {}", e);
            }
            text
        });

        Ok(Running {
            program: self.program.clone(),
            stdout: BufReader::new(stdout),
            child,
            stderr: stderr_task,
        })
    }
}

/// A spawned model command whose stdout is being consumed.
struct Running {
    program: String,
    stdout: BufReader<ChildStdout>,
    child: Child,
    stderr: JoinHandle<String>,
}

impl Running {
    async fn finish(mut self) -> chatsh_core::Result<()> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ChatshError::Backend(format!("failed to wait for {}: {}", self.program, e)))?;
        let stderr = self.stderr.await.unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        warn!(target: "chatsh::backend", "{} exited with {}", self.program, status);
        Err(ChatshError::Backend(format!(
            "{} exited with {}: {}",
            self.program,
            status,
            stderr.trim()
        )))
    }
}

impl LanguageModel for CommandBackend {
    fn ask<'a>(&'a self, request: AskRequest<'a>) -> BoxStream<'a, chatsh_core::Result<String>> {
        let running = match self.spawn(&request) {
            Ok(running) => running,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        stream::unfold(Some(running), |state| async move {
            let Some(mut running) = state else {
                return None;
            };
            let mut line = Vec::new();
            match running.stdout.read_until(b'\n', &mut line).await {
                Ok(0) => running.finish().await.err().map(|e| (Err(e), None)),
                Ok(_) => Some((
                    Ok(String::from_utf8_lossy(&line).into_owned()),
                    Some(running),
                )),
                Err(e) => Some((
                    Err(ChatshError::Backend(format!(
                        "failed to read output of {}: {}",
                        running.program, e
                    ))),
                    None,
                )),
            }
        })
        .boxed()
    }
}
