/*!
 # Craft Warden

 A Rust library for supervising dedicated Minecraft server processes.

 ## Overview

 Craft Warden provides functionality to:
 - Start, stop and force-kill a Java server process with a tuned JVM command line
 - Classify the server's console output into chat, login, logout, EULA and error events
 - Swap the server jar version with restart-if-running semantics
 - Take consistent world backups by bracketing file copies with save commands

 ## Basic Usage

 ```no_run
 use craft_warden::server::NoopObserver;
 use craft_warden::version::{InstanceStore, VersionCatalog};
 use craft_warden::{Result, ServerWrapper};
 use std::sync::Arc;

 async fn run(catalog: Arc<dyn VersionCatalog>, store: Arc<dyn InstanceStore>) -> Result<()> {
     // Create a wrapper from a config file
     let wrapper =
         ServerWrapper::from_config_file("survival.yaml", catalog, store, Arc::new(NoopObserver))
             .await?;

     // Start the server
     wrapper.start().await?;
     println!("Players online: {:?}", wrapper.supervisor().online_players());

     // Stop it gracefully
     wrapper.stop(false).await?;
     Ok(())
 }
 ```

 ## Features

 - **Process Supervision**: Graceful `/stop` with a timeout, then forced termination
 - **Console Classification**: Ordered regex tables over the server's log envelope
 - **Updates**: Version checks against the upstream manifest and version swaps
 - **Backups**: `save-all`/`save-off`/`save-on` bracketing around pluggable file copies
 - **Configuration**: JSON or YAML instance files, validated before launch
*/

pub mod backup;
pub mod config;
pub mod console;
pub mod error;
pub mod housekeeping;
pub mod server;
pub mod update;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{ProcessSupervisor, ServerStatus};

use backup::{BackupCoordinator, BackupReport, FileCopier};
use server::{AdminCommand, JavaLaunch, ServerControl, SessionObserver, SupervisorOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use update::{ManifestSource, UpdateCoordinator, UpdateOutcome};
use version::{CurrentVersion, InstanceStore, VersionCatalog, VersionDescriptor};

/// One supervised server instance
///
/// Ties together the configuration, the process supervisor and the update
/// and backup coordinators that operate on it.
/// All public lifecycle methods are instrumented with `tracing` spans.
pub struct ServerWrapper {
    /// Configuration
    config: Config,
    /// Supervisor of the server process
    supervisor: ProcessSupervisor,
    /// Version swaps
    updates: UpdateCoordinator,
    /// World backups
    backups: BackupCoordinator,
}

impl ServerWrapper {
    /// Create a wrapper from a configuration file path
    #[tracing::instrument(skip(path, catalog, store, observer), fields(config_path = ?path.as_ref()))]
    pub async fn from_config_file(
        path: impl AsRef<Path>,
        catalog: Arc<dyn VersionCatalog>,
        store: Arc<dyn InstanceStore>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::new(config, catalog, store, observer).await
    }

    /// Create a wrapper from a configuration
    ///
    /// The configuration is validated and its current version id resolved
    /// through the catalog.
    #[tracing::instrument(skip_all, fields(server = %config.name))]
    pub async fn new(
        config: Config,
        catalog: Arc<dyn VersionCatalog>,
        store: Arc<dyn InstanceStore>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        config::validate_config(&config)?;

        let current = match config.current_version_id {
            Some(id) => Some(catalog.find_by_id(id).await?.ok_or_else(|| {
                tracing::error!(version_id = id, "Configured version is not in the catalog");
                Error::VersionNotFound(format!("Version #{}", id))
            })?),
            None => None,
        };
        let current = CurrentVersion::new(current);

        let supervisor = ProcessSupervisor::new(
            config.name.clone(),
            JavaLaunch::new(&config, current.clone()),
            observer,
            SupervisorOptions::from_config(&config),
        )?;
        let control: Arc<dyn ServerControl> = Arc::new(supervisor.clone());

        let updates = UpdateCoordinator::new(
            config.name.clone(),
            config.server.server_type,
            config.artifact_dir.clone(),
            Arc::clone(&control),
            catalog,
            store,
            current,
        );
        let backups = BackupCoordinator::new(config.name.clone(), config.root_dir.clone(), control);

        tracing::info!("Server wrapper ready");
        Ok(Self {
            config,
            supervisor,
            updates,
            backups,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the process supervisor
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Get the update coordinator
    pub fn updates(&self) -> &UpdateCoordinator {
        &self.updates
    }

    /// Get the backup coordinator
    pub fn backups(&self) -> &BackupCoordinator {
        &self.backups
    }

    /// Get the server status
    pub fn status(&self) -> ServerStatus {
        self.supervisor.status()
    }

    /// The version the instance currently runs
    pub fn current_version(&self) -> Result<Option<VersionDescriptor>> {
        self.updates.current_version()
    }

    /// Start the server
    #[tracing::instrument(skip(self), fields(server = %self.config.name))]
    pub async fn start(&self) -> Result<()> {
        self.supervisor.start().await
    }

    /// Stop the server
    #[tracing::instrument(skip(self), fields(server = %self.config.name))]
    pub async fn stop(&self, force: bool) -> Result<()> {
        self.supervisor.stop(force).await
    }

    /// Send an administrative command to the running server
    pub async fn send_command(&self, command: AdminCommand) -> Result<()> {
        self.supervisor.send_command(command).await
    }

    /// Fetch new upstream versions, then move to the newest one
    #[tracing::instrument(skip(self, source), fields(server = %self.config.name))]
    pub async fn update_to_latest(&self, source: &dyn ManifestSource) -> Result<UpdateOutcome> {
        let added = self.updates.check_for_new_versions(source).await?;
        tracing::debug!(added = added.len(), "Version check finished");
        self.updates.apply_latest().await
    }

    /// Move to a specific catalog version
    pub async fn apply_version_id(&self, version_id: i64) -> Result<UpdateOutcome> {
        self.updates.apply_version_id(version_id).await
    }

    /// Back up the instance into `staging`
    pub async fn backup(&self, copier: &dyn FileCopier, staging: &Path) -> Result<BackupReport> {
        self.backups.run(copier, staging).await
    }

    /// Accept the server EULA for this instance
    pub async fn accept_eula(&self) -> Result<PathBuf> {
        housekeeping::accept_eula(&self.config.root_dir).await
    }
}
