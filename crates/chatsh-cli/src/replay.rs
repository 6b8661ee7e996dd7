//! Offline inspection of a written interaction log.

use chatsh_core::{ChatshError, InteractionLog};
use chatsh_types::Interaction;

/// Which part of a log to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Playback starting at an interaction.
    From(u64),
    /// Root-to-interaction path.
    Branch(u64),
}

pub fn select(log: &InteractionLog, selection: Selection) -> chatsh_core::Result<Vec<&Interaction>> {
    match selection {
        Selection::All => Ok(log.playback_conversation(None)),
        Selection::From(id) => {
            ensure_known(log, id)?;
            Ok(log.playback_conversation(Some(id)))
        }
        Selection::Branch(id) => {
            ensure_known(log, id)?;
            Ok(log.get_conversation_branch(id))
        }
    }
}

fn ensure_known(log: &InteractionLog, id: u64) -> chatsh_core::Result<()> {
    match log.get(id) {
        Some(_) => Ok(()),
        None => Err(ChatshError::UnknownInteraction(id)),
    }
}

/// Human-readable listing, one header line per interaction followed by the
/// indented content.
pub fn render_text(interactions: &[&Interaction]) -> String {
    let mut out = String::new();
    for interaction in interactions {
        let parent = match interaction.parent_id {
            Some(parent_id) => format!("parent {parent_id}"),
            None => "root".to_string(),
        };
        out.push_str(&format!(
            "[{}] {} ({}) {}\n",
            interaction.interaction_id,
            interaction.kind,
            parent,
            interaction.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
        for line in interaction.content.lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        if !interaction.metadata.is_empty() {
            out.push_str(&format!(
                "    {}\n",
                serde_json::Value::Object(interaction.metadata.clone())
            ));
        }
    }
    out
}

pub fn render_json(interactions: &[&Interaction]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(interactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsh_core::RecordFormat;
    use tempfile::TempDir;

    fn sample_log(temp_dir: &TempDir) -> InteractionLog {
        let mut log = InteractionLog::create(temp_dir.path(), RecordFormat::JsonArray).unwrap();
        let user = log.record_user_message("list files").unwrap();
        let response = log.record_llm_response("```sh\nls\n```", user).unwrap();
        let prompt = log.record_code_execution_prompt("ls", response).unwrap();
        log.record_code_execution_decision(true, prompt).unwrap();
        log.record_code_execution_output("a b", prompt).unwrap();
        log.record_user_message("thanks").unwrap();
        InteractionLog::load_from_file(log.path()).unwrap()
    }

    #[test]
    fn test_select_branch_and_playback() {
        let temp_dir = TempDir::new().unwrap();
        let log = sample_log(&temp_dir);

        let branch: Vec<u64> = select(&log, Selection::Branch(4))
            .unwrap()
            .iter()
            .map(|i| i.interaction_id)
            .collect();
        assert_eq!(branch, vec![1, 2, 3, 4]);

        let from: Vec<u64> = select(&log, Selection::From(3))
            .unwrap()
            .iter()
            .map(|i| i.interaction_id)
            .collect();
        assert_eq!(from, vec![1, 2, 3, 4, 5]);

        assert_eq!(select(&log, Selection::All).unwrap().len(), 6);
    }

    #[test]
    fn test_unknown_id() {
        let temp_dir = TempDir::new().unwrap();
        let log = sample_log(&temp_dir);
        assert!(matches!(
            select(&log, Selection::Branch(42)),
            Err(ChatshError::UnknownInteraction(42))
        ));
    }

    #[test]
    fn test_render_text() {
        let temp_dir = TempDir::new().unwrap();
        let log = sample_log(&temp_dir);
        let branch = select(&log, Selection::Branch(4)).unwrap();
        let text = render_text(&branch);

        assert!(text.starts_with("[1] user_message (root) "));
        assert!(text.contains("[2] llm_response (parent 1) "));
        assert!(text.contains("    ```sh\n    ls\n    ```\n"));
        assert!(text.contains("    {\"executed\":true}\n"));
    }

    #[test]
    fn test_render_json_is_loadable_shape() {
        let temp_dir = TempDir::new().unwrap();
        let log = sample_log(&temp_dir);
        let all = select(&log, Selection::All).unwrap();
        let json = render_json(&all).unwrap();

        let parsed: Vec<Interaction> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed[4].parent_id, Some(3));
    }
}
