use crate::config::{Config, ServerConfiguration};
use crate::error::{Error, Result};
use crate::housekeeping;
use crate::version::{CurrentVersion, ServerType};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Heap size from which the large-heap G1 tuning is used.
pub const LARGE_HEAP_THRESHOLD_MB: u32 = 12288;

const G1_HEAD: [&str; 6] = [
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:+AlwaysPreTouch",
];

const G1_LARGE_HEAP: [&str; 5] = [
    "-XX:G1NewSizePercent=40",
    "-XX:G1MaxNewSizePercent=50",
    "-XX:G1HeapRegionSize=16M",
    "-XX:G1ReservePercent=15",
    "-XX:InitiatingHeapOccupancyPercent=20",
];

const G1_SMALL_HEAP: [&str; 5] = [
    "-XX:G1NewSizePercent=30",
    "-XX:G1MaxNewSizePercent=40",
    "-XX:G1HeapRegionSize=8M",
    "-XX:G1ReservePercent=20",
    "-XX:InitiatingHeapOccupancyPercent=15",
];

const G1_TAIL: [&str; 7] = [
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=4",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:+PerfDisableSharedMem",
    "-XX:MaxTenuringThreshold=1",
];

/// Builds the JVM command line for a server jar.
///
/// # Examples
///
/// ```
/// use craft_warden::config::ServerConfiguration;
/// use craft_warden::server::LaunchArgumentBuilder;
/// use std::path::Path;
///
/// let config = ServerConfiguration { memory_megabytes: 4096, ..Default::default() };
/// let args = LaunchArgumentBuilder::build(&config, Path::new("/srv/jar/release_3.jar"));
///
/// assert_eq!(&args[..3], ["-server", "-Xmx4096M", "-Xms4096M"]);
/// assert!(args.contains(&"-XX:G1HeapRegionSize=8M".to_string()));
/// ```
pub struct LaunchArgumentBuilder;

impl LaunchArgumentBuilder {
    /// Ordered arguments: heap flags, G1 tuning for the heap tier, then
    /// `-jar <binary> nogui`.
    pub fn build(config: &ServerConfiguration, binary: &Path) -> Vec<String> {
        let memory = config.memory_megabytes;
        let tier = if memory >= LARGE_HEAP_THRESHOLD_MB {
            &G1_LARGE_HEAP
        } else {
            &G1_SMALL_HEAP
        };

        let mut args = vec![
            "-server".to_string(),
            format!("-Xmx{}M", memory),
            format!("-Xms{}M", memory),
        ];
        args.extend(G1_HEAD.iter().map(|s| s.to_string()));
        args.extend(tier.iter().map(|s| s.to_string()));
        args.extend(G1_TAIL.iter().map(|s| s.to_string()));
        args.push("-jar".to_string());
        args.push(binary.to_string_lossy().into_owned());
        args.push("nogui".to_string());
        args
    }
}

/// Everything needed to spawn the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Executable
    pub program: PathBuf,
    /// Arguments in order
    pub args: Vec<String>,
    /// Working directory, inherited when `None`
    pub working_dir: Option<PathBuf>,
}

/// Resolves the launch plan at the moment the server is started.
#[async_trait]
pub trait LaunchSource: Send + Sync {
    /// Chores run before every start, whoever triggers it. An error aborts
    /// the start.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Plan for the next start
    fn launch_plan(&self) -> Result<LaunchPlan>;
}

#[async_trait]
impl LaunchSource for LaunchPlan {
    fn launch_plan(&self) -> Result<LaunchPlan> {
        Ok(self.clone())
    }
}

/// Location of a downloaded server jar.
pub fn artifact_path(artifact_dir: &Path, server_type: ServerType, version_id: i64) -> PathBuf {
    artifact_dir.join(format!("{}_{}.jar", server_type, version_id))
}

/// Launches the instance's current version with the configured JVM.
///
/// The current version is read on every start, so a restart after an
/// update runs the new jar.
pub struct JavaLaunch {
    java_path: PathBuf,
    root_dir: PathBuf,
    logs_dir: PathBuf,
    artifact_dir: PathBuf,
    server: ServerConfiguration,
    current: CurrentVersion,
}

impl JavaLaunch {
    /// Create a launch source from the instance configuration
    pub fn new(config: &Config, current: CurrentVersion) -> Self {
        Self {
            java_path: config.java_path.clone(),
            root_dir: config.root_dir.clone(),
            logs_dir: config.logs_dir(),
            artifact_dir: config.artifact_dir.clone(),
            server: config.server.clone(),
            current,
        }
    }
}

#[async_trait]
impl LaunchSource for JavaLaunch {
    /// Prune old server logs. A failed prune is logged and does not block
    /// the start.
    async fn prepare(&self) -> Result<()> {
        let retention = self.server.log_retention_days;
        if let Err(e) = housekeeping::prune_old_logs(&self.logs_dir, retention).await {
            tracing::warn!(error = %e, "Failed to prune old logs");
        }
        Ok(())
    }

    fn launch_plan(&self) -> Result<LaunchPlan> {
        let version = self.current.get()?.ok_or_else(|| {
            Error::ConfigInvalid("No server version selected for this instance".to_string())
        })?;
        let jar = artifact_path(&self.artifact_dir, version.server_type, version.id);

        Ok(LaunchPlan {
            program: self.java_path.clone(),
            args: LaunchArgumentBuilder::build(&self.server, &jar),
            working_dir: Some(self.root_dir.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionDescriptor;
    use chrono::Utc;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn config(memory: u32) -> ServerConfiguration {
        ServerConfiguration {
            memory_megabytes: memory,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let jar = Path::new("/srv/jar/release_1.jar");
        assert_eq!(
            LaunchArgumentBuilder::build(&config(2048), jar),
            LaunchArgumentBuilder::build(&config(2048), jar)
        );
    }

    #[test]
    fn test_memory_flags_match_configuration() {
        for memory in [512, 2048, 12287, 12288, 32768] {
            let args = LaunchArgumentBuilder::build(&config(memory), Path::new("server.jar"));
            assert!(args.contains(&format!("-Xmx{}M", memory)));
            assert!(args.contains(&format!("-Xms{}M", memory)));
        }
    }

    #[test]
    fn test_heap_tier_boundary() {
        let small = LaunchArgumentBuilder::build(&config(12287), Path::new("server.jar"));
        assert!(small.contains(&"-XX:G1HeapRegionSize=8M".to_string()));
        assert!(small.contains(&"-XX:G1ReservePercent=20".to_string()));
        assert!(!small.contains(&"-XX:G1HeapRegionSize=16M".to_string()));

        let large = LaunchArgumentBuilder::build(&config(12288), Path::new("server.jar"));
        assert!(large.contains(&"-XX:G1HeapRegionSize=16M".to_string()));
        assert!(large.contains(&"-XX:InitiatingHeapOccupancyPercent=20".to_string()));
        assert!(!large.contains(&"-XX:G1HeapRegionSize=8M".to_string()));
    }

    #[test]
    fn test_tail_and_target_order() {
        let args = LaunchArgumentBuilder::build(&config(1024), Path::new("/jar/a.jar"));
        let n = args.len();
        assert_eq!(args[n - 4], "-XX:MaxTenuringThreshold=1");
        assert_eq!(&args[n - 3..], ["-jar", "/jar/a.jar", "nogui"]);
    }

    #[test]
    fn test_java_launch_requires_version() {
        let config = Config::new("test", "/srv/test", "/srv/jar");
        let current = CurrentVersion::default();
        let launch = JavaLaunch::new(&config, current.clone());

        assert!(matches!(launch.launch_plan(), Err(Error::ConfigInvalid(_))));

        current
            .set(Some(VersionDescriptor {
                id: 7,
                version_name: "1.21.4".to_string(),
                server_type: ServerType::Release,
                release_timestamp: Utc::now(),
            }))
            .unwrap();

        let plan = launch.launch_plan().unwrap();
        assert_eq!(plan.program, PathBuf::from("java"));
        assert_eq!(plan.working_dir, Some(PathBuf::from("/srv/test")));
        assert!(plan.args.contains(&"/srv/jar/release_7.jar".to_string()));
    }

    #[tokio::test]
    async fn test_prepare_prunes_expired_logs() {
        let root = TempDir::new().unwrap();
        let logs = root.path().join("logs");
        std::fs::create_dir(&logs).unwrap();
        std::fs::write(logs.join("2024-01-01-1.log.gz"), "old").unwrap();
        std::fs::write(logs.join("latest.log"), "new").unwrap();
        File::options()
            .write(true)
            .open(logs.join("2024-01-01-1.log.gz"))
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(10 * 86_400))
            .unwrap();

        let mut config = Config::new("test", root.path(), "/srv/jar");
        config.server.log_retention_days = 7;
        let launch = JavaLaunch::new(&config, CurrentVersion::default());

        launch.prepare().await.unwrap();

        assert!(!logs.join("2024-01-01-1.log.gz").exists());
        assert!(logs.join("latest.log").exists());
    }
}
