//! Append-only interaction ledger.
//!
//! Every event of a session is recorded here with a causal parent pointer and
//! flushed to disk before the recorder returns. The ledger is independent of
//! [`ConversationHistory`](crate::ConversationHistory): rewinding the
//! conversation never removes or rewrites a record.
//!
//! Two on-disk encodings are supported:
//! - [`RecordFormat::JsonArray`]: a single JSON array that parses after every
//!   append. Each append overwrites only the closing bracket, so the cost is
//!   independent of the log size.
//! - [`RecordFormat::JsonLines`]: one compact JSON object per line.

use crate::{ChatshError, Result};
use chatsh_types::{Interaction, InteractionType, Metadata};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of a freshly created array-format log.
const EMPTY_ARRAY: &[u8] = b"[\n]";
/// Bytes every array-format log ends with between appends.
const ARRAY_TAIL: &[u8; 2] = b"\n]";
/// Upper bound on file name collisions tried within one second.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// On-disk encoding of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// One JSON array, valid after every append.
    #[default]
    JsonArray,
    /// Newline-delimited JSON objects.
    JsonLines,
}

impl RecordFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordFormat::JsonArray => "json",
            RecordFormat::JsonLines => "jsonl",
        }
    }
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "json_array" | "json" => Ok(RecordFormat::JsonArray),
            "json_lines" | "jsonl" => Ok(RecordFormat::JsonLines),
            _ => Err(format!(
                "Invalid record format: '{}'. Use 'json_array' or 'json_lines'.",
                s
            )),
        }
    }
}

/// Open handle of a live log plus the offset of its logical end.
#[derive(Debug)]
struct LedgerWriter {
    file: File,
    end: u64,
}

/// Durable, causally linked record of a session.
#[derive(Debug)]
pub struct InteractionLog {
    path: PathBuf,
    format: RecordFormat,
    interactions: Vec<Interaction>,
    index_by_id: HashMap<u64, usize>,
    next_id: u64,
    /// `None` for logs loaded for inspection.
    writer: Option<LedgerWriter>,
}

impl InteractionLog {
    /// Create a new log file in `log_dir`, named from the current local time.
    pub fn create(log_dir: &Path, format: RecordFormat) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("interaction_log_{stamp}.{}", format.extension())
            } else {
                format!("interaction_log_{stamp}_{attempt}.{}", format.extension())
            };

            match Self::create_at(&log_dir.join(name), format) {
                Err(ChatshError::LogWrite { source, .. })
                    if source.kind() == ErrorKind::AlreadyExists =>
                {
                    continue;
                }
                result => return result,
            }
        }

        Err(ChatshError::LogWrite {
            path: log_dir.to_path_buf(),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no free interaction log file name",
            ),
        })
    }

    /// Create a new log at exactly `path`. Fails if the file already exists.
    pub fn create_at(path: &Path, format: RecordFormat) -> Result<Self> {
        let log_write = |source| ChatshError::LogWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(log_write)?;

        let header: &[u8] = match format {
            RecordFormat::JsonArray => EMPTY_ARRAY,
            RecordFormat::JsonLines => b"",
        };
        file.write_all(header).map_err(log_write)?;
        file.sync_all().map_err(log_write)?;

        info!(target: "chatsh::log", "Created interaction log {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            format,
            interactions: Vec::new(),
            index_by_id: HashMap::new(),
            next_id: 1,
            writer: Some(LedgerWriter {
                file,
                end: header.len() as u64,
            }),
        })
    }

    /// Reconstruct a log from a previously written file, for inspection only.
    ///
    /// The format is detected from the content. The returned log rejects
    /// further writes with [`ChatshError::ReadOnlyLog`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let invalid = |reason: String| ChatshError::InvalidLogFile {
            path: path.to_path_buf(),
            reason,
        };

        let (format, records) = if content.trim_start().starts_with('[') {
            let records: Vec<Interaction> =
                serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
            (RecordFormat::JsonArray, records)
        } else {
            let mut records = Vec::new();
            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record = serde_json::from_str::<Interaction>(line)
                    .map_err(|e| invalid(format!("line {}: {}", index + 1, e)))?;
                records.push(record);
            }
            (RecordFormat::JsonLines, records)
        };

        let mut index_by_id = HashMap::with_capacity(records.len());
        let mut next_id = 1;
        for (index, record) in records.iter().enumerate() {
            if index_by_id.insert(record.interaction_id, index).is_some() {
                return Err(invalid(format!(
                    "duplicate interaction id {}",
                    record.interaction_id
                )));
            }
            let following = record.interaction_id.checked_add(1).ok_or_else(|| {
                invalid(format!(
                    "interaction id {} out of range",
                    record.interaction_id
                ))
            })?;
            next_id = next_id.max(following);
        }

        debug!(
            target: "chatsh::log",
            "Loaded {} interactions from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            interactions: records,
            index_by_id,
            next_id,
            writer: None,
        })
    }

    /// Record an event and flush it to disk.
    ///
    /// Returns the id allocated to the new interaction. Any failure to persist
    /// is reported as a fatal error; the id is not handed out again.
    pub fn add_interaction(
        &mut self,
        kind: InteractionType,
        content: &str,
        metadata: Option<Metadata>,
        parent_id: Option<u64>,
    ) -> Result<u64> {
        if self.writer.is_none() {
            return Err(ChatshError::ReadOnlyLog);
        }

        let id = self.next_id;
        if let Some(parent_id) = parent_id {
            if parent_id >= id {
                return Err(ChatshError::InvalidParent { id, parent_id });
            }
        }
        self.next_id += 1;

        let interaction = Interaction::new(
            id,
            kind,
            content,
            metadata.unwrap_or_default(),
            parent_id,
        );
        self.append_record(&interaction)?;

        debug!(
            target: "chatsh::log",
            "Recorded interaction {} ({}) parent={:?}",
            id,
            kind,
            parent_id
        );

        self.index_by_id.insert(id, self.interactions.len());
        self.interactions.push(interaction);
        Ok(id)
    }

    fn append_record(&mut self, interaction: &Interaction) -> Result<()> {
        let has_records = !self.interactions.is_empty();
        let writer = self.writer.as_mut().ok_or(ChatshError::ReadOnlyLog)?;

        match self.format {
            RecordFormat::JsonArray => {
                let body = serde_json::to_string_pretty(interaction)?;
                let separator = if has_records { "," } else { "" };
                let bytes = format!("{separator}\n{body}\n]");
                append_to_array(writer, &self.path, bytes.as_bytes())
            }
            RecordFormat::JsonLines => {
                let mut line = serde_json::to_string(interaction)?;
                line.push('\n');
                check_length(writer, &self.path)?;
                let offset = writer.end;
                write_at(writer, &self.path, offset, line.as_bytes())
            }
        }
    }

    pub fn record_user_message(&mut self, message: &str) -> Result<u64> {
        self.add_interaction(InteractionType::UserMessage, message, None, None)
    }

    pub fn record_llm_response(&mut self, response: &str, parent_id: u64) -> Result<u64> {
        self.add_interaction(InteractionType::LlmResponse, response, None, Some(parent_id))
    }

    pub fn record_code_execution_prompt(&mut self, code: &str, parent_id: u64) -> Result<u64> {
        self.add_interaction(
            InteractionType::CodeExecutionPrompt,
            code,
            None,
            Some(parent_id),
        )
    }

    pub fn record_code_execution_decision(&mut self, executed: bool, parent_id: u64) -> Result<u64> {
        let mut metadata = Metadata::new();
        metadata.insert("executed".into(), Value::Bool(executed));
        let content = if executed { "executed" } else { "skipped" };
        self.add_interaction(
            InteractionType::CodeExecutionDecision,
            content,
            Some(metadata),
            Some(parent_id),
        )
    }

    /// The parent is the execution prompt, not the decision.
    pub fn record_code_execution_output(&mut self, output: &str, parent_id: u64) -> Result<u64> {
        self.add_interaction(
            InteractionType::CodeExecutionOutput,
            output,
            None,
            Some(parent_id),
        )
    }

    pub fn record_back_command(&mut self, steps: usize, removed_turns: usize) -> Result<u64> {
        let mut metadata = Metadata::new();
        metadata.insert("steps".into(), Value::from(steps));
        metadata.insert("removed_turns".into(), Value::from(removed_turns));
        self.add_interaction(
            InteractionType::BackCommand,
            &format!("Went back {steps} steps"),
            Some(metadata),
            None,
        )
    }

    pub fn record_exit(&mut self, reason: &str) -> Result<u64> {
        let lowered = reason.to_lowercase();
        let exit_type = if lowered.contains("good bot") {
            "good_bot"
        } else if lowered.contains("bad bot") {
            "bad_bot"
        } else {
            "ended"
        };
        let mut metadata = Metadata::new();
        metadata.insert("exit_type".into(), Value::from(exit_type));
        self.add_interaction(InteractionType::ExitCommand, reason, Some(metadata), None)
    }

    pub fn record_error(&mut self, error: &str, parent_id: Option<u64>) -> Result<u64> {
        self.add_interaction(InteractionType::Error, error, None, parent_id)
    }

    pub fn record_system_message(&mut self, message: &str, parent_id: Option<u64>) -> Result<u64> {
        self.add_interaction(InteractionType::SystemMessage, message, None, parent_id)
    }

    /// Path from the root of `interaction_id`'s branch down to it.
    ///
    /// Unknown ids yield an empty path. A parent missing from the log ends the
    /// walk and the partial path is returned.
    pub fn get_conversation_branch(&self, interaction_id: u64) -> Vec<&Interaction> {
        let mut branch = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(interaction_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let Some(interaction) = self.get(id) else {
                break;
            };
            branch.push(interaction);
            current = interaction.parent_id;
        }

        branch.reverse();
        branch
    }

    /// Replay the log.
    ///
    /// Without `start_id` every interaction is returned in chronological
    /// order. With it, the branch leading to `start_id` is followed by every
    /// later interaction descending from that branch.
    /// Descendants are gathered transitively: a grandchild of the branch is
    /// included even though its own parent is not on the branch.
    pub fn playback_conversation(&self, start_id: Option<u64>) -> Vec<&Interaction> {
        let Some(start_id) = start_id else {
            return self.interactions.iter().collect();
        };

        let mut result = self.get_conversation_branch(start_id);
        let Some(last) = result.last() else {
            return result;
        };
        let branch_end = last.interaction_id;
        let mut downstream: HashSet<u64> = result.iter().map(|i| i.interaction_id).collect();

        // Ids are allocated in append order, so id order is chronological order.
        for interaction in &self.interactions {
            if interaction.interaction_id <= branch_end {
                continue;
            }
            let descends = interaction
                .parent_id
                .is_some_and(|parent| downstream.contains(&parent));
            if descends {
                downstream.insert(interaction.interaction_id);
                result.push(interaction);
            }
        }

        result
    }

    /// Direct children of `interaction_id`, in chronological order.
    pub fn children_of(&self, interaction_id: u64) -> Vec<&Interaction> {
        self.interactions
            .iter()
            .filter(|i| i.parent_id == Some(interaction_id))
            .collect()
    }

    pub fn get(&self, interaction_id: u64) -> Option<&Interaction> {
        self.index_by_id
            .get(&interaction_id)
            .map(|&index| &self.interactions[index])
    }

    pub fn get_latest_interaction(&self) -> Option<&Interaction> {
        self.interactions.last()
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }
}

/// Replace the closing bracket of an array-format log with `bytes`.
///
/// The tail is checked first; a file that no longer ends where and how this
/// process left it is reported as corrupt instead of being patched.
fn append_to_array(writer: &mut LedgerWriter, path: &Path, bytes: &[u8]) -> Result<()> {
    let corrupt = |reason: &str| ChatshError::CorruptLog {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let log_write = |source| ChatshError::LogWrite {
        path: path.to_path_buf(),
        source,
    };

    check_length(writer, path)?;

    let tail_offset = writer
        .end
        .checked_sub(ARRAY_TAIL.len() as u64)
        .ok_or_else(|| corrupt("file is shorter than an empty array"))?;

    let mut tail = [0u8; 2];
    writer
        .file
        .seek(SeekFrom::Start(tail_offset))
        .map_err(log_write)?;
    writer.file.read_exact(&mut tail).map_err(log_write)?;
    if &tail != ARRAY_TAIL {
        return Err(corrupt("missing closing bracket"));
    }

    write_at(writer, path, tail_offset, bytes)
}

fn check_length(writer: &LedgerWriter, path: &Path) -> Result<()> {
    let on_disk = writer
        .file
        .metadata()
        .map_err(|source| ChatshError::LogWrite {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if on_disk != writer.end {
        return Err(ChatshError::CorruptLog {
            path: path.to_path_buf(),
            reason: "file length changed outside this process".to_string(),
        });
    }
    Ok(())
}

/// Write `bytes` at `offset` in a single call and flush to stable storage.
fn write_at(writer: &mut LedgerWriter, path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    let log_write = |source| ChatshError::LogWrite {
        path: path.to_path_buf(),
        source,
    };

    writer
        .file
        .seek(SeekFrom::Start(offset))
        .map_err(log_write)?;
    writer.file.write_all(bytes).map_err(log_write)?;
    writer.file.sync_data().map_err(log_write)?;
    writer.end = offset + bytes.len() as u64;
    Ok(())
}
