//! Backups of a live server.
//!
//! The server keeps writing chunks while it runs, so the world is only copied
//! between a `save-all` + `save-off` pair and the closing `save-on`. The copy
//! itself goes through a [`FileCopier`].

use crate::error::{Error, Result};
use crate::server::{AdminCommand, ServerControl, ServerStatus};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files the server holds open or rebuilds on its own.
pub const DEFAULT_IGNORED: [&str; 2] = ["session.lock", "usercache.json"];

/// Name of the world directory inside the instance root.
pub const WORLD_DIR: &str = "World";

/// File copy operations used by backups.
#[async_trait]
pub trait FileCopier: Send + Sync {
    /// Copy a directory tree, skipping entries whose file name is in `ignore_names`
    async fn copy_tree(&self, source: &Path, destination: &Path, ignore_names: &[String])
    -> Result<()>;

    /// Copy a single file
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// [`FileCopier`] backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileCopier;

fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Io(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl FileCopier for LocalFileCopier {
    async fn copy_tree(
        &self,
        source: &Path,
        destination: &Path,
        ignore_names: &[String],
    ) -> Result<()> {
        let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];

        while let Some((from, to)) = pending.pop() {
            tokio::fs::create_dir_all(&to)
                .await
                .map_err(|e| io_error("create", &to, e))?;

            let mut entries = tokio::fs::read_dir(&from)
                .await
                .map_err(|e| io_error("read", &from, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("read", &from, e))?
            {
                let name = entry.file_name();
                if ignore_names.iter().any(|ignored| name == ignored.as_str()) {
                    continue;
                }

                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_error("inspect", &entry.path(), e))?;
                let target = to.join(&name);

                if file_type.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    self.copy_file(&entry.path(), &target).await?;
                }
            }
        }

        Ok(())
    }

    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<()> {
        tokio::fs::copy(source, destination)
            .await
            .map(|_| ())
            .map_err(|e| io_error("copy", source, e))
    }
}

/// What a backup run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    /// Whether autosave was suspended around the copy
    pub quiesced: bool,
    /// Whether a world directory was found and copied
    pub world_copied: bool,
    /// Number of root-level files copied
    pub files_copied: usize,
}

/// Brackets file copies of an instance with the server's save commands.
pub struct BackupCoordinator {
    name: String,
    root_dir: PathBuf,
    ignore: Vec<String>,
    control: Arc<dyn ServerControl>,
}

impl BackupCoordinator {
    /// Create a coordinator that skips [`DEFAULT_IGNORED`]
    pub fn new(
        name: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        control: Arc<dyn ServerControl>,
    ) -> Self {
        Self {
            name: name.into(),
            root_dir: root_dir.into(),
            ignore: DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
            control,
        }
    }

    /// Replace the set of ignored file names
    pub fn with_ignored(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignore = names.into_iter().map(Into::into).collect();
        self
    }

    /// Flush the world, then disable autosave
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn begin_quiesce(&self) -> Result<()> {
        self.control.send_command(AdminCommand::SaveAll).await?;
        self.control.send_command(AdminCommand::SaveOff).await?;
        tracing::debug!("Autosave suspended");
        Ok(())
    }

    /// Re-enable autosave; with nobody online the world counts as backed up
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn end_quiesce(&self) -> Result<()> {
        self.control.send_command(AdminCommand::SaveOn).await?;

        if self.control.active_sessions() == 0 {
            self.control.clear_dirty();
        }
        tracing::debug!("Autosave resumed");
        Ok(())
    }

    /// Copy the world directory and the root-level files into `staging`
    pub async fn copy_files(&self, copier: &dyn FileCopier, staging: &Path) -> Result<BackupReport> {
        let mut report = BackupReport::default();
        let world = self.root_dir.join(WORLD_DIR);

        if tokio::fs::metadata(&world)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            copier
                .copy_tree(&world, &staging.join(WORLD_DIR), &self.ignore)
                .await?;
            report.world_copied = true;
        } else {
            tracing::warn!(server = %self.name, "No world directory found");
        }

        let mut entries = tokio::fs::read_dir(&self.root_dir)
            .await
            .map_err(|e| io_error("read", &self.root_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("read", &self.root_dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let name = entry.file_name();
            if !is_file || self.ignore.iter().any(|ignored| name == ignored.as_str()) {
                continue;
            }

            copier.copy_file(&entry.path(), &staging.join(&name)).await?;
            report.files_copied += 1;
        }

        tracing::info!(server = %self.name, files = report.files_copied, "Backup copy is done");
        Ok(report)
    }

    /// Back up the instance into `staging`.
    ///
    /// A running server is quiesced for the duration of the copy; autosave is
    /// re-enabled even when the copy fails.
    #[tracing::instrument(skip(self, copier), fields(server = %self.name))]
    pub async fn run(&self, copier: &dyn FileCopier, staging: &Path) -> Result<BackupReport> {
        if self.control.status() != ServerStatus::Running {
            let report = self.copy_files(copier, staging).await?;
            self.control.clear_dirty();
            return Ok(report);
        }

        self.begin_quiesce().await?;
        let copied = self.copy_files(copier, staging).await;
        let resumed = self.end_quiesce().await;

        let mut report = copied?;
        resumed?;
        report.quiesced = true;
        Ok(report)
    }
}
