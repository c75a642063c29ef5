/// Server management module for Craft Warden.
///
/// This module handles the lifecycle of the supervised server process, the
/// dispatch of its console output, and the JVM launch policy.
/// All public lifecycle operations are instrumented with `tracing` spans.
///
/// # Components
///
/// * `process` - The process supervisor and its state machine
/// * `launch` - JVM argument policy and launch plans
/// * `login` - Correlation of UUID and login lines
/// * `lifecycle` - History of session lifecycle events
/// * `observer` - Notification hooks raised while output is dispatched
///
/// # Examples
///
/// Building a JVM command line:
///
/// ```
/// use craft_warden::config::ServerConfiguration;
/// use craft_warden::server::LaunchArgumentBuilder;
/// use std::path::Path;
///
/// let config = ServerConfiguration { memory_megabytes: 16384, ..Default::default() };
/// let args = LaunchArgumentBuilder::build(&config, Path::new("release_4.jar"));
/// assert!(args.contains(&"-XX:G1HeapRegionSize=16M".to_string()));
/// ```
///
/// Reacting to logins:
///
/// ```
/// use async_trait::async_trait;
/// use craft_warden::server::SessionObserver;
///
/// struct Greeter;
///
/// #[async_trait]
/// impl SessionObserver for Greeter {
///     async fn player_logged_in(&self, user: &str, external_id: Option<&str>) {
///         println!("{} joined ({})", user, external_id.unwrap_or("offline"));
///     }
/// }
/// ```
mod dispatch;
pub mod launch;
pub mod lifecycle;
pub mod login;
pub mod observer;
mod process;

pub use launch::{JavaLaunch, LaunchArgumentBuilder, LaunchPlan, LaunchSource, artifact_path};
pub use lifecycle::{ServerEvent, ServerLifecycleEvent, ServerLifecycleManager, SessionId};
pub use login::LoginCorrelator;
pub use observer::{ConfigurationRequired, NoopObserver, SessionObserver};
pub use process::{AdminCommand, ProcessSupervisor, ServerControl, ServerStatus, SupervisorOptions};
