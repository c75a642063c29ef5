use super::manifest::{ManifestSource, NEWEST_VERSIONS_CHECKED};
use crate::error::{Error, Result};
use crate::server::{ServerControl, ServerStatus, artifact_path};
use crate::version::{CurrentVersion, InstanceStore, ServerType, VersionCatalog, VersionDescriptor};
use std::path::PathBuf;
use std::sync::Arc;

/// A version swap that was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTransaction {
    /// Version id before the swap
    pub from_version: Option<i64>,
    /// Version id after the swap
    pub to_version: i64,
    /// Whether the server was running, and so was restarted
    pub was_running: bool,
}

/// Result of an update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The requested version is already current; nothing was touched
    AlreadyCurrent,
    /// The version was swapped
    Applied(UpdateTransaction),
}

/// Moves an instance between server versions.
///
/// A running server is stopped gracefully before the swap and started again
/// afterwards. Requests for a version of another server type are refused
/// before anything is changed.
pub struct UpdateCoordinator {
    name: String,
    server_type: ServerType,
    artifact_dir: PathBuf,
    control: Arc<dyn ServerControl>,
    catalog: Arc<dyn VersionCatalog>,
    store: Arc<dyn InstanceStore>,
    current: CurrentVersion,
}

impl UpdateCoordinator {
    /// Create a coordinator for one instance
    pub fn new(
        name: impl Into<String>,
        server_type: ServerType,
        artifact_dir: impl Into<PathBuf>,
        control: Arc<dyn ServerControl>,
        catalog: Arc<dyn VersionCatalog>,
        store: Arc<dyn InstanceStore>,
        current: CurrentVersion,
    ) -> Self {
        Self {
            name: name.into(),
            server_type,
            artifact_dir: artifact_dir.into(),
            control,
            catalog,
            store,
            current,
        }
    }

    /// The version the instance currently runs
    pub fn current_version(&self) -> Result<Option<VersionDescriptor>> {
        self.current.get()
    }

    /// Record every new upstream version of the configured type and make
    /// sure its server jar is on disk.
    ///
    /// A version the catalog already knows is downloaded again when its jar
    /// is missing, so a failed download is retried by the next check.
    /// Returns the versions whose jar was downloaded, oldest first.
    #[tracing::instrument(skip(self, source), fields(server = %self.name, server_type = %self.server_type))]
    pub async fn check_for_new_versions(
        &self,
        source: &dyn ManifestSource,
    ) -> Result<Vec<VersionDescriptor>> {
        tracing::info!("Checking for new server versions");
        let manifest = source.fetch_manifest().await?;
        let mut downloaded = Vec::new();

        for entry in manifest.newest_of(self.server_type, NEWEST_VERSIONS_CHECKED) {
            let known = self
                .catalog
                .find_by_name(self.server_type, &entry.id)
                .await?;

            if let Some(version) = &known {
                let jar = artifact_path(&self.artifact_dir, self.server_type, version.id);
                if tokio::fs::try_exists(&jar).await.unwrap_or(false) {
                    continue;
                }
                tracing::warn!(version = %entry.id, "Server jar is missing, downloading it again");
            }

            let release = source.fetch_release(&entry.url).await?;
            let Some(server) = release.downloads.server else {
                tracing::warn!(version = %entry.id, "Version has no server download, skipping");
                continue;
            };

            let version = match known {
                Some(version) => version,
                None => {
                    self.catalog
                        .record(self.server_type, &entry.id, entry.release_time)
                        .await?
                }
            };
            self.download_artifact(source, &server.url, version.id)
                .await?;

            tracing::info!(
                version = %version.version_name,
                version_id = version.id,
                "Downloaded server version"
            );
            downloaded.push(version);
        }

        Ok(downloaded)
    }

    /// Download into a `.part` file and move it into place once complete.
    async fn download_artifact(
        &self,
        source: &dyn ManifestSource,
        url: &str,
        version_id: i64,
    ) -> Result<()> {
        let jar = artifact_path(&self.artifact_dir, self.server_type, version_id);
        let mut partial = jar.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        if let Err(e) = source.download(url, &partial).await {
            tracing::error!(error = %e, url, "Download of server jar failed");
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, &jar).await.map_err(|e| {
            Error::Io(format!(
                "Failed to move {} into place: {}",
                partial.display(),
                e
            ))
        })
    }

    /// Update to the newest known version of the configured type
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn apply_latest(&self) -> Result<UpdateOutcome> {
        tracing::info!("Checking if server needs an update");
        let latest = self
            .catalog
            .find_current(self.server_type)
            .await?
            .ok_or_else(|| {
                Error::VersionNotFound(format!("No {} version is known", self.server_type))
            })?;

        self.apply_version(&latest).await
    }

    /// Update to the version with the given catalog id
    #[tracing::instrument(skip(self), fields(server = %self.name))]
    pub async fn apply_version_id(&self, version_id: i64) -> Result<UpdateOutcome> {
        let version = self.catalog.find_by_id(version_id).await?.ok_or_else(|| {
            tracing::error!(version_id, "Could not find requested version");
            Error::VersionNotFound(format!("Version #{}", version_id))
        })?;

        tracing::info!(version = %version.version_name, "Upgrading server");
        self.apply_version(&version).await
    }

    /// Switch the instance to `target`, restarting the server if it was running
    #[tracing::instrument(skip(self, target), fields(server = %self.name, version_id = target.id))]
    pub async fn apply_version(&self, target: &VersionDescriptor) -> Result<UpdateOutcome> {
        if target.server_type != self.server_type {
            tracing::error!(
                requested = %target.server_type,
                configured = %self.server_type,
                "Refusing update to a version of a different server type"
            );
            return Err(Error::VersionTypeMismatch {
                version_id: target.id,
                requested: target.server_type,
                configured: self.server_type,
            });
        }

        let from_version = self.current.id()?;
        if from_version == Some(target.id) {
            tracing::info!(version = %target.version_name, "Server is already running this version");
            return Ok(UpdateOutcome::AlreadyCurrent);
        }

        let was_running = self.control.status() == ServerStatus::Running;
        if was_running {
            self.control.stop(false).await?;
        }

        tracing::warn!(
            from = ?from_version,
            to = target.id,
            "Updating server jar version"
        );

        if let Err(e) = self.store.save_current_version(target.id).await {
            tracing::error!(error = %e, "Failed to persist the new version, keeping the old one");
            if was_running {
                if let Err(restart) = self.control.start().await {
                    tracing::error!(error = %restart, "Failed to restart on the old version");
                }
            }
            return Err(e);
        }

        self.current.set(Some(target.clone()))?;
        self.control.clear_corrupt_artifact();

        if was_running {
            self.control.start().await?;
        }

        Ok(UpdateOutcome::Applied(UpdateTransaction {
            from_version,
            to_version: target.id,
            was_running,
        }))
    }
}
