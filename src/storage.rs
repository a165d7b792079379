//! File-backed persistence helpers
//!
//! Every persisted artifact (list, cache, report, ledger) is read once at the
//! start of a run and rewritten as a whole snapshot at the end.

use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{LoadError, Result};

/// Reads a UTF-8 file, distinguishing a missing file from other failures
pub async fn read_text(path: &Path) -> std::result::Result<String, LoadError> {
    match fs::read(path).await {
        Ok(bytes) => String::from_utf8(bytes).map_err(|e| LoadError::Malformed(e.to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(LoadError::Missing),
        Err(e) => Err(LoadError::Io(e)),
    }
}

/// Writes the whole file through a temp file and a rename
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    let mut file = fs::File::create(temp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp_path, path).await?;

    debug!(path = %path.display(), bytes = contents.len(), "File written");
    Ok(())
}

/// Serializes `value` as pretty JSON with a trailing newline
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write_atomic(path, json.as_bytes()).await
}
