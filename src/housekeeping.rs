//! Instance directory chores: EULA acceptance and log retention.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

/// File the server reads its EULA acceptance from.
pub const EULA_FILE: &str = "eula.txt";

/// Accept the server EULA for the instance rooted at `root`.
#[tracing::instrument(skip(root), fields(root = %root.as_ref().display()))]
pub async fn accept_eula(root: impl AsRef<Path>) -> Result<PathBuf> {
    let path = root.as_ref().join(EULA_FILE);
    tokio::fs::write(&path, "eula=true\n")
        .await
        .map_err(|e| Error::Io(format!("Failed to write {}: {}", path.display(), e)))?;

    tracing::info!("EULA accepted");
    Ok(path)
}

/// Delete files in `logs_dir` last modified more than `retention_days` ago.
///
/// A negative retention keeps everything. A missing directory is not an
/// error. Returns the number of files removed.
#[tracing::instrument(skip(logs_dir), fields(logs_dir = %logs_dir.as_ref().display()))]
pub async fn prune_old_logs(logs_dir: impl AsRef<Path>, retention_days: i32) -> Result<usize> {
    if retention_days < 0 {
        return Ok(0);
    }

    let logs_dir = logs_dir.as_ref();
    let mut entries = match tokio::fs::read_dir(logs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(Error::Io(format!(
                "Failed to read {}: {}",
                logs_dir.display(),
                e
            )));
        }
    };

    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut removed = 0;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::Io(format!("Failed to read {}: {}", logs_dir.display(), e)))?
    {
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(path = ?entry.path(), error = %e, "Skipping unreadable log entry");
                continue;
            }
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };

        if DateTime::<Utc>::from(modified) < cutoff {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = ?entry.path(), error = %e, "Failed to delete old log"),
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, "Deleted old log files");
    }
    Ok(removed)
}
