// src/server/process.rs
use super::dispatch::{LineDispatcher, SessionPresence};
use super::launch::LaunchSource;
use super::lifecycle::{ServerLifecycleEvent, ServerLifecycleManager, SessionId};
use super::observer::SessionObserver;
use crate::config::Config;
use crate::console::{ConsoleClassifier, OutputStream, RawLine};
use crate::error::{Error, Result};
use async_process::{Child, ChildStdin, Command, Stdio};
use async_trait::async_trait;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use std::process::ExitStatus;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// How long a finished session may take to flush its remaining output.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Status of the supervised server process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Server is starting
    Starting,
    /// Server is running
    Running,
    /// Server is stopping
    Stopping,
    /// Server has stopped
    Stopped,
}

/// Administrative commands understood by the server console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Flush all chunks to disk
    SaveAll,
    /// Disable autosave
    SaveOff,
    /// Re-enable autosave
    SaveOn,
    /// Shut the server down
    Stop,
}

impl AdminCommand {
    /// Text written to the server's stdin
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminCommand::SaveAll => "save-all",
            AdminCommand::SaveOff => "save-off",
            AdminCommand::SaveOn => "save-on",
            AdminCommand::Stop => "/stop",
        }
    }
}

/// Timing knobs of the supervisor
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// How long a graceful stop may take before the process is killed
    pub stop_timeout: Duration,
    /// Pause after each administrative command
    pub command_settle: Duration,
}

impl SupervisorOptions {
    /// Options taken from an instance configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            stop_timeout: config.stop_timeout(),
            command_settle: config.command_settle(),
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(30),
            command_settle: Duration::from_secs(5),
        }
    }
}

/// Lifecycle operations the update and backup coordinators rely on.
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Current lifecycle state
    fn status(&self) -> ServerStatus;

    /// Start the server
    async fn start(&self) -> Result<()>;

    /// Stop the server, killing it right away when `force` is set
    async fn stop(&self, force: bool) -> Result<()>;

    /// Write an administrative command and wait for it to settle
    async fn send_command(&self, command: AdminCommand) -> Result<()>;

    /// Number of players currently online
    fn active_sessions(&self) -> usize;

    /// Mark the world as backed up
    fn clear_dirty(&self);

    /// Forget a corrupt-artifact signal after the jar has been replaced
    fn clear_corrupt_artifact(&self);
}

/// The child process of the running session
#[derive(Default)]
struct Session {
    id: Option<SessionId>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    dispatch: Option<JoinHandle<()>>,
}

struct Shared {
    name: String,
    launch: Box<dyn LaunchSource>,
    observer: Arc<dyn SessionObserver>,
    classifier: Arc<ConsoleClassifier>,
    lifecycle: ServerLifecycleManager,
    options: SupervisorOptions,
    presence: Arc<SessionPresence>,
    status: RwLock<ServerStatus>,
    /// Lifecycle lock; every state transition happens while holding it
    session: Mutex<Session>,
}

/// Supervises one server process.
///
/// The supervisor owns the child process, moves it through
/// `Stopped → Starting → Running → Stopping → Stopped`, and feeds every
/// output line through the console classifier in the order it was printed.
/// Cloning is cheap; clones control the same process.
///
/// # Examples
///
/// ```no_run
/// use craft_warden::server::{LaunchPlan, NoopObserver, ProcessSupervisor, SupervisorOptions};
/// use std::sync::Arc;
///
/// # async fn run() -> craft_warden::Result<()> {
/// let plan = LaunchPlan {
///     program: "java".into(),
///     args: vec!["-jar".into(), "server.jar".into(), "nogui".into()],
///     working_dir: Some("/srv/minecraft/survival".into()),
/// };
/// let supervisor = ProcessSupervisor::new(
///     "survival",
///     plan,
///     Arc::new(NoopObserver),
///     SupervisorOptions::default(),
/// )?;
///
/// supervisor.start().await?;
/// supervisor.stop(false).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
}

impl ProcessSupervisor {
    /// Create a stopped supervisor
    pub fn new(
        name: impl Into<String>,
        launch: impl LaunchSource + 'static,
        observer: Arc<dyn SessionObserver>,
        options: SupervisorOptions,
    ) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                launch: Box::new(launch),
                observer,
                classifier: Arc::new(ConsoleClassifier::new()?),
                lifecycle: ServerLifecycleManager::new(),
                options,
                presence: Arc::new(SessionPresence::default()),
                status: RwLock::new(ServerStatus::Stopped),
                session: Mutex::new(Session::default()),
            }),
        })
    }

    /// Get the server name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Get the server status
    pub fn status(&self) -> ServerStatus {
        *self
            .shared
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ServerStatus) {
        tracing::debug!(server = %self.shared.name, ?status, "Status changed");
        *self
            .shared
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Lifecycle history of this server
    pub fn lifecycle(&self) -> &ServerLifecycleManager {
        &self.shared.lifecycle
    }

    /// Id of the running session, if any
    pub async fn session_id(&self) -> Option<SessionId> {
        self.shared.session.lock().await.id
    }

    /// Players currently online, sorted by name
    pub fn online_players(&self) -> Vec<String> {
        self.shared.presence.players()
    }

    /// Number of players currently online
    pub fn active_sessions(&self) -> usize {
        self.shared.presence.player_count()
    }

    /// Whether players have been online since the last backup
    pub fn is_dirty(&self) -> bool {
        self.shared.presence.is_dirty()
    }

    /// Mark the world as backed up
    pub fn clear_dirty(&self) {
        self.shared.presence.set_dirty(false);
    }

    /// Error text of an outstanding corrupt-artifact signal
    pub fn corrupt_artifact(&self) -> Option<String> {
        self.shared.presence.corrupt_artifact()
    }

    /// Allow starts again after the server jar has been replaced
    pub fn clear_corrupt_artifact(&self) {
        self.shared.presence.set_corrupt_artifact(None);
    }

    /// Start the server process
    #[tracing::instrument(skip(self), fields(server = %self.shared.name))]
    pub async fn start(&self) -> Result<()> {
        let mut session = self.shared.session.lock().await;

        if self.status() != ServerStatus::Stopped || session.child.is_some() {
            return Err(Error::AlreadyRunning);
        }

        if let Some(detail) = self.corrupt_artifact() {
            tracing::warn!("Refusing to start with a corrupt server jar");
            return Err(Error::CorruptArtifact(detail));
        }

        self.shared.launch.prepare().await?;
        let plan = self.shared.launch.launch_plan()?;
        tracing::info!(program = ?plan.program, args = plan.args.len(), "Starting server");
        self.set_status(ServerStatus::Starting);

        let mut command = Command::new(&plan.program);
        command.args(&plan.args);
        if let Some(dir) = &plan.working_dir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.set_status(ServerStatus::Stopped);
                tracing::error!(error = %e, "Failed to spawn server process");
                return Err(Error::Process(format!("Failed to start process: {}", e)));
            }
        };

        let id = SessionId::new();
        self.shared.presence.reset_players();

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_stream_reader(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stream_reader(stderr, OutputStream::Stderr, tx.clone());
        }
        drop(tx);

        let dispatcher = LineDispatcher::new(
            self.shared.name.clone(),
            id,
            Arc::clone(&self.shared.classifier),
            Arc::clone(&self.shared.observer),
            Arc::clone(&self.shared.presence),
            self.shared.lifecycle.clone(),
        );
        let dispatch = tokio::spawn(run_session(
            Arc::downgrade(&self.shared),
            id,
            dispatcher,
            rx,
        ));

        // An early exit still counts as a started session. Its output is
        // dispatched like any other, so a corrupt jar is flagged, and the
        // reaper records the exit as Crashed and returns to Stopped.
        match child.try_status() {
            Ok(Some(exit)) => {
                tracing::warn!(%exit, "Server exited immediately after launch")
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Could not query server process"),
        }

        session.id = Some(id);
        session.stdin = child.stdin.take();
        session.child = Some(child);
        session.dispatch = Some(dispatch);

        self.record(id, ServerLifecycleEvent::Started, None);
        self.set_status(ServerStatus::Running);
        tracing::info!(session = %id, "Server started");

        Ok(())
    }

    /// Stop the server process.
    ///
    /// Without `force` the server is asked to `/stop` and given the
    /// configured timeout to exit; after that, or with `force`, it is killed.
    #[tracing::instrument(skip(self), fields(server = %self.shared.name))]
    pub async fn stop(&self, force: bool) -> Result<()> {
        let mut session = self.shared.session.lock().await;

        if !matches!(self.status(), ServerStatus::Starting | ServerStatus::Running) {
            return Err(Error::NotRunning);
        }
        let Some(mut child) = session.child.take() else {
            self.set_status(ServerStatus::Stopped);
            return Err(Error::NotRunning);
        };

        self.set_status(ServerStatus::Stopping);
        let mut stdin = session.stdin.take();
        let mut exit = None;

        if !force {
            let sent = match stdin.as_mut() {
                Some(stdin) => match write_line(stdin, AdminCommand::Stop.as_str()).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not send stop command");
                        false
                    }
                },
                None => false,
            };

            if sent {
                match tokio::time::timeout(self.shared.options.stop_timeout, child.status()).await
                {
                    Ok(Ok(status)) => exit = Some(status),
                    Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for server exit"),
                    Err(_) => tracing::warn!(
                        timeout = ?self.shared.options.stop_timeout,
                        "Server did not stop in time, killing it"
                    ),
                }
            }
        }
        drop(stdin);

        let event = match exit {
            Some(_) => ServerLifecycleEvent::Stopped,
            None => {
                exit = kill(&mut child).await;
                ServerLifecycleEvent::Killed
            }
        };

        self.finish_session(&mut session, event, exit).await;
        tracing::info!(?event, "Server stopped");
        Ok(())
    }

    /// Write an administrative command, then wait for the settle delay.
    ///
    /// A failed write ends the session: the process is killed and the
    /// supervisor returns to `Stopped`.
    #[tracing::instrument(skip(self), fields(server = %self.shared.name, command = command.as_str()))]
    pub async fn send_command(&self, command: AdminCommand) -> Result<()> {
        {
            let mut session = self.shared.session.lock().await;

            if self.status() != ServerStatus::Running {
                return Err(Error::NotRunning);
            }

            let written = match session.stdin.as_mut() {
                Some(stdin) => write_line(stdin, command.as_str())
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("stdin is closed".to_string()),
            };

            if let Err(e) = written {
                tracing::error!(error = %e, "Lost connection to server console");
                session.stdin = None;
                let exit = match session.child.as_mut() {
                    Some(child) => kill(child).await,
                    None => None,
                };
                session.child = None;
                self.finish_session(&mut session, ServerLifecycleEvent::Killed, exit)
                    .await;
                return Err(Error::Communication(format!(
                    "Failed to send '{}': {}",
                    command.as_str(),
                    e
                )));
            }
        }

        tracing::debug!("Command sent, waiting for server to settle");
        tokio::time::sleep(self.shared.options.command_settle).await;
        Ok(())
    }

    /// Tear down the rest of the session after its process has exited.
    async fn finish_session(
        &self,
        session: &mut Session,
        event: ServerLifecycleEvent,
        exit: Option<ExitStatus>,
    ) {
        if let Some(mut dispatch) = session.dispatch.take() {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut dispatch).await.is_err() {
                tracing::warn!("Output streams did not close, abandoning them");
                dispatch.abort();
            }
        }

        if let Some(id) = session.id.take() {
            self.record(id, event, exit.map(|s| s.to_string()));
        }
        session.stdin = None;
        session.child = None;
        self.shared.presence.reset_players();
        self.set_status(ServerStatus::Stopped);
    }

    /// Release a process that exited on its own.
    async fn reap(&self, id: SessionId) {
        let mut session = self.shared.session.lock().await;

        if session.id != Some(id) {
            return;
        }
        let Some(child) = session.child.as_mut() else {
            return;
        };

        let waited = tokio::time::timeout(DRAIN_TIMEOUT, child.status()).await;
        match waited {
            Ok(Ok(exit)) => {
                tracing::warn!(server = %self.shared.name, %exit, "Server exited on its own");
                // The dispatch task has already finished; it is what spawned us
                session.dispatch = None;
                self.finish_session(&mut session, ServerLifecycleEvent::Crashed, Some(exit))
                    .await;
            }
            Ok(Err(e)) => {
                tracing::error!(server = %self.shared.name, error = %e, "Failed to reap server process")
            }
            Err(_) => tracing::warn!(
                server = %self.shared.name,
                "Server closed its output but is still running"
            ),
        }
    }

    fn record(&self, id: SessionId, event: ServerLifecycleEvent, details: Option<String>) {
        if let Err(e) = self
            .shared
            .lifecycle
            .record_event(id, &self.shared.name, event, details)
        {
            tracing::warn!(error = %e, "Failed to record lifecycle event");
        }
    }
}

#[async_trait]
impl ServerControl for ProcessSupervisor {
    fn status(&self) -> ServerStatus {
        ProcessSupervisor::status(self)
    }

    async fn start(&self) -> Result<()> {
        ProcessSupervisor::start(self).await
    }

    async fn stop(&self, force: bool) -> Result<()> {
        ProcessSupervisor::stop(self, force).await
    }

    async fn send_command(&self, command: AdminCommand) -> Result<()> {
        ProcessSupervisor::send_command(self, command).await
    }

    fn active_sessions(&self) -> usize {
        ProcessSupervisor::active_sessions(self)
    }

    fn clear_dirty(&self) {
        ProcessSupervisor::clear_dirty(self)
    }

    fn clear_corrupt_artifact(&self) {
        ProcessSupervisor::clear_corrupt_artifact(self)
    }
}

/// Dispatch every line of a session, then hand the exited process back.
async fn run_session(
    shared: Weak<Shared>,
    id: SessionId,
    mut dispatcher: LineDispatcher,
    mut lines: mpsc::UnboundedReceiver<RawLine>,
) {
    while let Some(line) = lines.recv().await {
        if let Some(detail) = dispatcher.dispatch(line).await {
            if let Some(shared) = shared.upgrade() {
                let supervisor = ProcessSupervisor { shared };
                // Not awaited: stop() waits for this task to drain
                tokio::spawn(async move {
                    match supervisor.stop(true).await {
                        Ok(()) | Err(Error::NotRunning) => {}
                        Err(e) => tracing::error!(error = %e, "Forced stop after corrupt jar failed"),
                    }
                    tracing::error!(detail = %detail, "Server jar must be replaced before the next start");
                });
            }
        }
    }

    dispatcher.finish().await;

    if let Some(shared) = shared.upgrade() {
        let supervisor = ProcessSupervisor { shared };
        tokio::spawn(async move { supervisor.reap(id).await });
    }
}

/// Read complete lines from a child pipe, decoding lossily.
fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: OutputStream,
    lines: mpsc::UnboundedSender<RawLine>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if lines.send(RawLine::new(text, kind)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(stream = ?kind, error = %e, "Stream reader exiting due to read error");
                    break;
                }
            }
        }
    });
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn kill(child: &mut Child) -> Option<ExitStatus> {
    if let Err(e) = child.kill() {
        // Already exited processes refuse the signal
        tracing::debug!(error = %e, "Kill failed");
    }
    match child.status().await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::error!(error = %e, "Failed to wait for killed process");
            None
        }
    }
}
