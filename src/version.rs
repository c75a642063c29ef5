//! Server versions and the capability traits used to look them up.
//!
//! The crate never decides how version metadata is stored. Callers pass in a
//! [`VersionCatalog`] for the shared list of known server builds and an
//! [`InstanceStore`] for the per-instance "current version" pointer.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Release channel of a Minecraft server build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Stable releases
    #[default]
    Release,
    /// Weekly snapshots and pre-releases
    Snapshot,
    /// Builds provided by the operator
    Custom,
}

impl ServerType {
    /// Name used in the upstream manifest and in artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Release => "release",
            ServerType::Snapshot => "snapshot",
            ServerType::Custom => "custom",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(ServerType::Release),
            "snapshot" => Ok(ServerType::Snapshot),
            "custom" => Ok(ServerType::Custom),
            other => Err(Error::ConfigInvalid(format!(
                "Unknown server type '{}'",
                other
            ))),
        }
    }
}

/// A server build known to the version catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// Catalog id
    pub id: i64,
    /// Upstream version name, e.g. `1.21.4` or `24w14a`
    pub version_name: String,
    /// Release channel this build belongs to
    pub server_type: ServerType,
    /// Upstream release time
    pub release_timestamp: DateTime<Utc>,
}

/// Shared catalog of known server versions.
#[async_trait]
pub trait VersionCatalog: Send + Sync {
    /// Newest known version of the given type.
    async fn find_current(&self, server_type: ServerType) -> Result<Option<VersionDescriptor>>;

    /// Look up a version by catalog id.
    async fn find_by_id(&self, id: i64) -> Result<Option<VersionDescriptor>>;

    /// Look up a version by its upstream name.
    async fn find_by_name(
        &self,
        server_type: ServerType,
        version_name: &str,
    ) -> Result<Option<VersionDescriptor>>;

    /// Record a newly discovered version and return its descriptor.
    async fn record(
        &self,
        server_type: ServerType,
        version_name: &str,
        release_timestamp: DateTime<Utc>,
    ) -> Result<VersionDescriptor>;
}

/// Persistence for the instance's current-version pointer.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Persist the version the instance should run from now on.
    async fn save_current_version(&self, version_id: i64) -> Result<()>;
}

/// The version an instance currently runs, shared between the update
/// coordinator and the launch source.
#[derive(Debug, Clone, Default)]
pub struct CurrentVersion {
    inner: Arc<RwLock<Option<VersionDescriptor>>>,
}

impl CurrentVersion {
    /// Create a pointer to the given version
    pub fn new(version: Option<VersionDescriptor>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(version)),
        }
    }

    /// The current version, if one is selected
    pub fn get(&self) -> Result<Option<VersionDescriptor>> {
        self.inner
            .read()
            .map(|v| v.clone())
            .map_err(|_| Error::Other("Failed to lock current version".to_string()))
    }

    /// Catalog id of the current version
    pub fn id(&self) -> Result<Option<i64>> {
        Ok(self.get()?.map(|v| v.id))
    }

    /// Replace the current version
    pub fn set(&self, version: Option<VersionDescriptor>) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| Error::Other("Failed to lock current version".to_string()))?;
        *guard = version;
        Ok(())
    }
}
