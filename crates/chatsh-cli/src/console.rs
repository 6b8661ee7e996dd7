//! Line-oriented terminal console.

use chatsh_core::Console;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

pub const PROMPT: &str = "λ ";
const CONFIRM_PROMPT: &str = "Execute the code? [Y/n] ";

/// Console over any line reader and writer; `stdio()` for the real terminal.
pub struct TerminalConsole<R, W> {
    input: Lines<R>,
    output: W,
}

impl TerminalConsole<BufReader<Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> TerminalConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: input.lines(),
            output,
        }
    }

    /// Show `prompt` and read one line. `None` at end of input.
    pub async fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        self.input.next_line().await
    }

    pub fn print(&mut self, text: &str) {
        self.write(format_args!("{text}\n"));
    }

    pub fn into_output(self) -> W {
        self.output
    }

    // Write errors are logged and dropped.
    fn write(&mut self, args: std::fmt::Arguments<'_>) {
        if self
            .output
            .write_fmt(args)
            .and_then(|_| self.output.flush())
            .is_err()
        {
            tracing::debug!(target: "chatsh::session", "Console output closed");
        }
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> Console for TerminalConsole<R, W> {
    fn response_chunk(&mut self, chunk: &str) {
        self.write(format_args!("{chunk}"));
    }

    fn response_done(&mut self) {
        self.write(format_args!("\n"));
    }

    async fn confirm_execution(&mut self, code: &str) -> bool {
        let framed = frame(&number_lines(code));
        self.write(format_args!("{framed}"));
        match self.read_line(CONFIRM_PROMPT).await {
            Ok(Some(answer)) => parse_confirmation(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(target: "chatsh::session", "Failed to read confirmation: {}", e);
                false
            }
        }
    }

    fn execution_output(&mut self, output: &str) {
        let framed = frame(output);
        self.write(format_args!("\n{framed}"));
    }

    fn notice(&mut self, message: &str) {
        self.write(format_args!("{message}\n"));
    }

    fn error(&mut self, message: &str) {
        self.write(format_args!("Error: {message}\n"));
    }
}

/// Empty answers accept.
fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}

fn number_lines(code: &str) -> String {
    let width = code.lines().count().to_string().len();
    code.lines()
        .enumerate()
        .map(|(i, line)| format!("{:>width$} │ {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn frame(body: &str) -> String {
    let rule = "─".repeat(60);
    format!("{rule}\n{body}\n{rule}\n")
}
