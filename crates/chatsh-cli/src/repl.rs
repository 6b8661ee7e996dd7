//! Interactive read-eval loop around a `ChatSession`.

use crate::console::{TerminalConsole, PROMPT};
use chatsh_core::{ChatSession, LanguageModel, RoundOutcome, ShellExecutor};
use std::io::Write;
use tokio::io::AsyncBufRead;
use tracing::debug;

/// Feed console lines to `session` until an exit phrase or end of input.
///
/// `initial` is handled as the first line without prompting. The session is
/// always finished before returning so the ledger ends with an exit record.
pub async fn run<B, S, R, W>(
    session: &mut ChatSession<B, S>,
    console: &mut TerminalConsole<R, W>,
    initial: Option<String>,
) -> anyhow::Result<()>
where
    B: LanguageModel,
    S: ShellExecutor,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut pending = initial;
    loop {
        let input = match pending.take() {
            Some(message) => message,
            None => match console.read_line(PROMPT).await? {
                Some(line) => line,
                None => {
                    console.print("");
                    break;
                }
            },
        };

        let outcome = session.handle_input(&input, console).await?;
        debug!(target: "chatsh::session", "Round finished: {:?}", outcome);
        if outcome == RoundOutcome::Exit {
            break;
        }
    }

    session.finish()?;
    if let Some(transcript) = session.transcript() {
        console.print(&format!(
            "Conversation transcript saved to: {}",
            transcript.path().display()
        ));
    }
    console.print(&format!(
        "Interaction log saved to: {}",
        session.log().path().display()
    ));
    Ok(())
}
