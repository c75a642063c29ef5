use crate::error::{Error, Result};
use crate::version::ServerType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Launch-relevant settings of a server instance.
///
/// This is the immutable snapshot consumed by
/// [`LaunchArgumentBuilder`](crate::server::LaunchArgumentBuilder).
///
/// # Examples
///
/// ```
/// use craft_warden::config::ServerConfiguration;
/// use craft_warden::version::ServerType;
///
/// let server = ServerConfiguration {
///     memory_megabytes: 8192,
///     server_type: ServerType::Snapshot,
///     log_retention_days: -1,
/// };
/// assert_eq!(server.server_type, ServerType::Snapshot);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfiguration {
    /// Heap size handed to the JVM, used for both `-Xmx` and `-Xms`.
    #[serde(default = "default_memory")]
    pub memory_megabytes: u32,

    /// Release channel the instance follows.
    #[serde(default)]
    pub server_type: ServerType,

    /// Remove log files older than this many days before each start.
    /// `-1` disables pruning.
    #[serde(default = "default_log_retention")]
    pub log_retention_days: i32,
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            memory_megabytes: default_memory(),
            server_type: ServerType::default(),
            log_retention_days: default_log_retention(),
        }
    }
}

/// Main configuration of a supervised server instance.
///
/// # JSON Schema
///
/// ```json
/// {
///   "name": "survival",
///   "rootDir": "/srv/minecraft/survival",
///   "artifactDir": "/srv/minecraft/jar",
///   "javaPath": "/usr/bin/java",
///   "server": {
///     "memoryMegabytes": 4096,
///     "serverType": "release",
///     "logRetentionDays": 14
///   },
///   "parameters": {
///     "server-port": "25565",
///     "motd": "Welcome"
///   },
///   "currentVersionId": 12,
///   "stopTimeoutSecs": 30,
///   "commandSettleMillis": 5000
/// }
/// ```
///
/// Only `name`, `rootDir` and `artifactDir` are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Display name of the instance, used in log records.
    pub name: String,

    /// Instance directory. The server runs with this as its working
    /// directory and keeps `World/`, `logs/` and `eula.txt` here.
    pub root_dir: PathBuf,

    /// Directory holding downloaded server jars.
    pub artifact_dir: PathBuf,

    /// Java executable used to launch the server.
    #[serde(default = "default_java_path")]
    pub java_path: PathBuf,

    /// Launch settings.
    #[serde(default)]
    pub server: ServerConfiguration,

    /// server.properties values. Serializing them to disk is up to the caller.
    #[serde(default)]
    pub parameters: HashMap<String, String>,

    /// Catalog id of the version the instance currently runs.
    #[serde(default)]
    pub current_version_id: Option<i64>,

    /// How long a graceful `/stop` may take before the process is killed.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Settle delay after each administrative command.
    #[serde(default = "default_command_settle")]
    pub command_settle_millis: u64,
}

fn default_memory() -> u32 {
    2048
}

fn default_log_retention() -> i32 {
    -1
}

fn default_java_path() -> PathBuf {
    PathBuf::from("java")
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_command_settle() -> u64 {
    5000
}

impl Config {
    /// Creates a configuration with default launch settings.
    pub fn new(
        name: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            root_dir: root_dir.into(),
            artifact_dir: artifact_dir.into(),
            java_path: default_java_path(),
            server: ServerConfiguration::default(),
            parameters: HashMap::new(),
            current_version_id: None,
            stop_timeout_secs: default_stop_timeout(),
            command_settle_millis: default_command_settle(),
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON or YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        if is_yaml {
            Self::parse_from_yaml_str(&content)
        } else {
            Self::parse_from_str(&content)
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Graceful stop timeout.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Settle delay after administrative commands.
    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_millis)
    }

    /// Port from the `server-port` parameter, if it parses.
    pub fn server_port(&self) -> Option<u16> {
        self.parameters
            .get("server-port")
            .and_then(|p| p.trim().parse().ok())
    }

    /// The directory the server writes its log files to.
    pub fn logs_dir(&self) -> PathBuf {
        self.root_dir.join("logs")
    }
}
