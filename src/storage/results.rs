use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crawler::task::ProfileMatch;

/// Append-only CSV file holding one task's accepted matches.
/// The header row is written exactly once, by the first append.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Result file path for a task inside `output_dir`
    pub fn path_for(output_dir: &Path, task_id: &str) -> PathBuf {
        output_dir.join(format!("output_{}.csv", task_id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove any file left at this path by an earlier run
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("Failed to remove stale result file: {}", self.path.display())),
        }
    }

    /// Append rows, creating the file and header on first use. Empty input writes nothing.
    pub fn append(&self, rows: &[ProfileMatch]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open result file: {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);

        for row in rows {
            writer.serialize(row).context("Failed to write result row")?;
        }
        writer.flush().context("Failed to flush result file")?;

        debug!("Appended {} rows to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }

    /// Read every stored row. `None` when nothing was ever written.
    pub fn read_all(&self) -> Result<Option<Vec<ProfileMatch>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .context(format!("Failed to open result file: {}", self.path.display()))?;

        let rows = reader
            .deserialize()
            .collect::<Result<Vec<ProfileMatch>, _>>()
            .context(format!("Failed to parse result file: {}", self.path.display()))?;

        Ok(Some(rows))
    }
}
