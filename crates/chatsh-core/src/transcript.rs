//! Human-readable conversation transcript.
//!
//! The transcript is a convenience copy of the visible conversation. It is not
//! the audit trail, so callers treat its write failures as warnings.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: File,
}

impl Transcript {
    /// Create `conversation_<timestamp>.txt` in `dir`.
    pub fn create(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let stamp = Local::now().format("%Y-%m-%dT%H-%M-%S%.6f").to_string();
        Self::open(&dir.join(format!("conversation_{stamp}.txt")))
    }

    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append a `<TAG>` block.
    pub fn append(&mut self, tag: &str, message: &str) -> std::io::Result<()> {
        let block = format!("<{tag}>\n{message}\n</{tag}>\n\n");
        self.file.write_all(block.as_bytes())?;
        self.file.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
