use crate::error::{Error, Result};
use crate::version::ServerType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How many of the newest manifest entries are considered per check.
pub const NEWEST_VERSIONS_CHECKED: usize = 10;

/// The upstream version manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    /// Ids of the newest release and snapshot
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    /// All versions, newest first
    pub versions: Vec<ManifestVersion>,
}

/// Ids of the newest release and snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestVersions {
    /// Newest release id
    pub release: String,
    /// Newest snapshot id
    pub snapshot: String,
}

/// One entry of the version manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersion {
    /// Version name, e.g. `1.21.4`
    pub id: String,
    /// Release channel name, e.g. `release`
    #[serde(rename = "type")]
    pub kind: String,
    /// Location of the version's release details
    pub url: String,
    /// Last modification
    pub time: DateTime<Utc>,
    /// Publication time
    pub release_time: DateTime<Utc>,
}

/// Release details of a single version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDetails {
    /// Version name
    pub id: String,
    /// Downloadable artifacts
    pub downloads: ReleaseDownloads,
}

/// Artifacts of a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDownloads {
    /// Client jar
    #[serde(default)]
    pub client: Option<DownloadItem>,
    /// Dedicated server jar
    #[serde(default)]
    pub server: Option<DownloadItem>,
}

/// A downloadable file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    /// SHA-1 of the file
    pub sha1: String,
    /// Size in bytes
    pub size: u64,
    /// Download location
    pub url: String,
}

impl VersionManifest {
    /// Parses a manifest document.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Serialization(format!("Failed to parse version manifest: {}", e)))
    }

    /// The entry the manifest marks as newest for a server type.
    pub fn latest_of(&self, server_type: ServerType) -> Option<&ManifestVersion> {
        let latest = self.latest.as_ref()?;
        let id = match server_type {
            ServerType::Release => &latest.release,
            ServerType::Snapshot => &latest.snapshot,
            ServerType::Custom => return None,
        };
        self.versions.iter().find(|v| &v.id == id)
    }

    /// The newest `limit` entries of a server type, oldest first.
    pub fn newest_of(&self, server_type: ServerType, limit: usize) -> Vec<&ManifestVersion> {
        let mut newest: Vec<&ManifestVersion> = self
            .versions
            .iter()
            .filter(|v| v.kind == server_type.as_str())
            .take(limit)
            .collect();
        newest.sort_by_key(|v| v.release_time);
        newest
    }
}

/// Retrieval of manifests and artifacts, implemented by the caller.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the version manifest
    async fn fetch_manifest(&self) -> Result<VersionManifest>;

    /// Fetch the release details behind a manifest entry
    async fn fetch_release(&self, url: &str) -> Result<ReleaseDetails>;

    /// Download a file to `destination`
    async fn download(&self, url: &str, destination: &Path) -> Result<()>;
}
