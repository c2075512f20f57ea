//! Append-only JSON-lines persistence.
//!
//! One record per line. The log is only ever appended to; readers rebuild
//! state by replaying it from the start.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::LedgerError;

/// Append-only log of serializable records.
pub struct JsonLinesLog<T> {
    path: PathBuf,
    file: Mutex<File>,
    _record: PhantomData<fn(T)>,
}

impl<T> JsonLinesLog<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open (or create) a log for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), "Opened append-only log");

        Ok(Self {
            path,
            file: Mutex::new(file),
            _record: PhantomData,
        })
    }

    /// Append one record as a single line.
    pub async fn append(&self, record: &T) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read every record in the log at `path`.
    ///
    /// A missing file reads as an empty log.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<T>, LedgerError> {
        let content = match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(LedgerError::from))
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
