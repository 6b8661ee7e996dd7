//! CLI configuration.

use anyhow::{bail, Result};
use chatsh_core::RecordFormat;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are ChatSH, an assistant that helps the user work in a terminal.
When a task needs shell commands, answer with a single ```sh block the user
can run. Keep explanations short. You will see the output of executed
commands in a <SYSTEM> block on the next turn.";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory receiving interaction logs and transcripts.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub record_format: RecordFormat,
    /// Model alias or full model id.
    #[serde(default = "default_model")]
    pub model: String,
    /// Alias table consulted by `resolve_model`.
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub cacheable_system_prompt: bool,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Takes precedence over `system_prompt`.
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    /// Append OS and shell details plus available helper tools to the prompt.
    #[serde(default = "default_true")]
    pub describe_system: bool,
    /// Program and arguments of the external model command.
    #[serde(default)]
    pub backend_command: Vec<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Write a plain-text transcript next to the interaction log.
    #[serde(default = "default_true")]
    pub transcript: bool,
}

fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatsh_history")
}

fn default_model() -> String {
    "s".to_string()
}

fn default_models() -> BTreeMap<String, String> {
    [
        ("g", "gpt-4o-2024-08-06"),
        ("G", "gpt-4-32k-0314"),
        ("h", "claude-3-haiku-20240307"),
        ("s", "claude-3-5-sonnet-20240620"),
        ("o", "claude-3-opus-20240229"),
        ("l", "llama-3.1-8b-instant"),
        ("L", "llama-3.1-70b-versatile"),
        ("i", "gemini-1.5-flash-latest"),
        ("I", "gemini-1.5-pro-exp-0801"),
    ]
    .into_iter()
    .map(|(alias, model)| (alias.to_string(), model.to_string()))
    .collect()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_true() -> bool {
    true
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            record_format: RecordFormat::default(),
            model: default_model(),
            models: default_models(),
            max_tokens: default_max_tokens(),
            cacheable_system_prompt: true,
            system_prompt: None,
            system_prompt_file: None,
            describe_system: true,
            backend_command: Vec::new(),
            shell: default_shell(),
            transcript: true,
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the user config directory or fall back to defaults.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                tracing::debug!(target: "chatsh::config", "Reading {}", path.display());
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    /// `<config dir>/chatsh/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatsh").join("config.toml"))
    }

    /// Expand a model alias; unknown names are passed through unchanged.
    pub fn resolve_model(&self, alias: &str) -> String {
        self.models
            .get(alias)
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }

    /// The configured system prompt, without the system description.
    pub fn base_system_prompt(&self) -> Result<String> {
        if let Some(path) = &self.system_prompt_file {
            return Ok(std::fs::read_to_string(path)?);
        }
        Ok(self
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()))
    }

    /// Split `backend_command` into program and arguments.
    pub fn backend_argv(&self) -> Result<(&str, &[String])> {
        match self.backend_command.split_first() {
            Some((program, args)) => Ok((program.as_str(), args)),
            None => bail!(
                "no backend_command configured; set it in {}",
                Self::default_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "the config file".to_string())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model, "s");
        assert_eq!(config.max_tokens, 8192);
        assert!(config.cacheable_system_prompt);
        assert!(config.transcript);
        assert_eq!(config.shell, "sh");
        assert_eq!(config.record_format, RecordFormat::JsonArray);
        assert!(config.log_dir.ends_with("chatsh_history"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            model = "h"
            record_format = "json_lines"
            backend_command = ["my-llm", "--stream"]
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "h");
        assert_eq!(config.record_format, RecordFormat::JsonLines);
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.models.len(), 9);

        let (program, args) = config.backend_argv().unwrap();
        assert_eq!(program, "my-llm");
        assert_eq!(args, ["--stream".to_string()]);
    }

    #[test]
    fn test_resolve_model() {
        let mut config = Config::default();
        assert_eq!(config.resolve_model("s"), "claude-3-5-sonnet-20240620");
        assert_eq!(config.resolve_model("gpt-4o-mini"), "gpt-4o-mini");

        config.models.insert("m".into(), "my-model".into());
        assert_eq!(config.resolve_model("m"), "my-model");
    }

    #[test]
    fn test_missing_backend_command() {
        let config = Config::default();
        assert!(config.backend_argv().is_err());
    }

    #[test]
    fn test_load_from_and_prompt_file() {
        let temp_dir = TempDir::new().unwrap();
        let prompt_path = temp_dir.path().join("system.prompt");
        std::fs::write(&prompt_path, "Be brief.").unwrap();

        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                "system_prompt = \"ignored\"\nsystem_prompt_file = {:?}\ntranscript = false\n",
                prompt_path.display().to_string()
            ),
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert!(!config.transcript);
        assert_eq!(config.base_system_prompt().unwrap(), "Be brief.");
    }

    #[test]
    fn test_inline_and_default_prompt() {
        let mut config = Config::default();
        assert!(config.base_system_prompt().unwrap().contains("```sh"));

        config.system_prompt = Some("Custom.".into());
        assert_eq!(config.base_system_prompt().unwrap(), "Custom.");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "max_tokens = \"lots\"").unwrap();
        assert!(Config::load_from(&config_path).is_err());
    }
}
