use crate::console::ChatKind;
use async_trait::async_trait;

/// Why the server needs operator attention before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationRequired {
    /// The EULA has not been accepted in `eula.txt`
    EulaNotAccepted,
}

/// Notifications raised while a session's console output is dispatched.
///
/// Every hook has an empty default, so implementors only override what they
/// care about. Hooks are awaited in line order; a slow hook delays the
/// processing of later lines.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// A chat message was logged
    async fn chat(&self, _kind: &ChatKind, _user: &str, _text: &str) {}

    /// A player completed login. `external_id` is the profile id announced
    /// by the preceding `UUID of player` line, if any.
    async fn player_logged_in(&self, _user: &str, _external_id: Option<&str>) {}

    /// A player lost connection
    async fn player_logged_out(&self, _user: &str) {}

    /// The server stopped itself until the operator intervenes
    async fn configuration_required(&self, _reason: ConfigurationRequired) {}

    /// The server jar could not be opened; the server has been force-stopped
    async fn corrupt_artifact(&self, _detail: &str) {}

    /// The session's output streams have closed
    async fn session_ended(&self) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl SessionObserver for NoopObserver {}
