//! File-backed word list.
//!
//! One keyword per line. Blank lines and lines starting with `#` are
//! ignored. The file is decoded lossily so a stray non-UTF-8 byte never
//! prevents a reload.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::WordListError;

/// Word list stored on disk.
#[derive(Debug, Clone)]
pub struct WordFile {
    path: PathBuf,
}

impl WordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load raw entries. A missing file is created empty and yields no
    /// entries.
    pub async fn load(&self) -> Result<Vec<String>, WordListError> {
        if !fs::try_exists(&self.path).await.map_err(|e| self.io_error(e))? {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
            }
            fs::write(&self.path, b"").await.map_err(|e| self.io_error(e))?;
            info!(path = %self.path.display(), "Created empty word list");
            return Ok(Vec::new());
        }

        let bytes = fs::read(&self.path).await.map_err(|e| self.io_error(e))?;
        let entries = parse_entries(&String::from_utf8_lossy(&bytes));
        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "Loaded word list"
        );
        Ok(entries)
    }

    fn io_error(&self, source: std::io::Error) -> WordListError {
        WordListError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Split word list text into trimmed, non-comment entries.
pub fn parse_entries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
