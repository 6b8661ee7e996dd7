//! Shell execution collaborator.

use tokio::process::Command;
use tracing::{debug, warn};

/// Runs proposed commands.
///
/// Failures are part of the returned text, never an error: whatever happened
/// is fed back to the model as ordinary context.
#[allow(async_fn_in_trait)]
pub trait ShellExecutor {
    async fn execute(&self, command: &str) -> String;
}

/// Executes commands through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ProcessShell {
    shell: String,
}

impl ProcessShell {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ProcessShell {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ShellExecutor for ProcessShell {
    async fn execute(&self, command: &str) -> String {
        debug!(target: "chatsh::shell", "Executing with {}: {}", self.shell, command);

        match Command::new(&self.shell).arg("-c").arg(command).output().await {
            Ok(output) => {
                debug!(target: "chatsh::shell", "Command exited with {}", output.status);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                format!("{}{}", stdout.trim(), stderr.trim())
            }
            Err(e) => {
                warn!(target: "chatsh::shell", "Failed to run {}: {}", self.shell, e);
                e.to_string()
            }
        }
    }
}
