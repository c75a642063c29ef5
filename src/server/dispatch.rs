use super::lifecycle::{ServerLifecycleEvent, ServerLifecycleManager, SessionId};
use super::login::LoginCorrelator;
use super::observer::{ConfigurationRequired, SessionObserver};
use crate::console::{
    ClassifiedEvent, ConsoleClassifier, CORRUPT_ARTIFACT_MARKER, OutputStream, RawLine,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Player presence and artifact health shared between the supervisor and the
/// dispatch task of the running session.
#[derive(Debug, Default)]
pub(crate) struct SessionPresence {
    players: Mutex<BTreeSet<String>>,
    dirty: AtomicBool,
    corrupt: Mutex<Option<String>>,
}

impl SessionPresence {
    pub(crate) fn reset_players(&self) {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn player_joined(&self, user: &str) {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string());
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub(crate) fn player_left(&self, user: &str) {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
    }

    pub(crate) fn players(&self) -> Vec<String> {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn player_count(&self) -> usize {
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::SeqCst);
    }

    pub(crate) fn corrupt_artifact(&self) -> Option<String> {
        self.corrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_corrupt_artifact(&self, detail: Option<String>) {
        *self.corrupt.lock().unwrap_or_else(PoisonError::into_inner) = detail;
    }
}

/// Classifies and handles the lines of one server session, in order.
pub(crate) struct LineDispatcher {
    name: String,
    session: SessionId,
    classifier: Arc<ConsoleClassifier>,
    correlator: LoginCorrelator,
    observer: Arc<dyn SessionObserver>,
    presence: Arc<SessionPresence>,
    lifecycle: ServerLifecycleManager,
}

impl LineDispatcher {
    pub(crate) fn new(
        name: String,
        session: SessionId,
        classifier: Arc<ConsoleClassifier>,
        observer: Arc<dyn SessionObserver>,
        presence: Arc<SessionPresence>,
        lifecycle: ServerLifecycleManager,
    ) -> Self {
        Self {
            name,
            session,
            classifier,
            correlator: LoginCorrelator::new(),
            observer,
            presence,
            lifecycle,
        }
    }

    /// Handle one line. Returns the error text when the line reports a
    /// corrupt server jar; the caller must then force-stop the process.
    pub(crate) async fn dispatch(&mut self, line: RawLine) -> Option<String> {
        let mut event = self.classifier.classify(&line.text);

        // The JVM reports launch failures on stderr without an envelope
        if line.stream == OutputStream::Stderr {
            if let ClassifiedEvent::Unclassified { raw_text } = event {
                event = ClassifiedEvent::ErrorLine { text: raw_text };
            }
        }

        let server = self.name.as_str();

        match event {
            ClassifiedEvent::Chat { kind, user, text } => {
                tracing::info!(target: "console", server, user = %user, "{} says: {}", user, text);
                self.observer.chat(&kind, &user, &text).await;
            }
            ClassifiedEvent::ErrorLine { text } if text.contains(CORRUPT_ARTIFACT_MARKER) => {
                tracing::error!(target: "console", server, "Server jar is corrupt: {}", text);
                self.presence.set_corrupt_artifact(Some(text.clone()));
                if let Err(e) = self.lifecycle.record_event(
                    self.session,
                    server,
                    ServerLifecycleEvent::CorruptArtifact,
                    Some(text.clone()),
                ) {
                    tracing::warn!(error = %e, "Failed to record corrupt artifact event");
                }
                self.observer.corrupt_artifact(&text).await;
                return Some(text);
            }
            ClassifiedEvent::ErrorLine { text } => {
                let first = text
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or_default();
                tracing::error!(target: "console", server, "{}", first);
            }
            ClassifiedEvent::WarnLine { text } => {
                tracing::warn!(target: "console", server, "{}", text);
            }
            ClassifiedEvent::Unclassified { raw_text } => {
                tracing::debug!(target: "console", server, "{}", raw_text);
            }
            ClassifiedEvent::PlayerLogin {
                user,
                uuid: Some(uuid),
            } => {
                self.correlator.on_uuid_line(&user, &uuid);
            }
            ClassifiedEvent::PlayerLogin { user, uuid: None } => {
                let external_id = self.correlator.on_plain_login_line(&user);
                self.presence.player_joined(&user);
                tracing::info!(
                    server,
                    user = %user,
                    external_id = external_id.as_deref().unwrap_or("-"),
                    "Player logged in"
                );
                self.observer
                    .player_logged_in(&user, external_id.as_deref())
                    .await;
            }
            ClassifiedEvent::PlayerLogout { user } => {
                self.presence.player_left(&user);
                tracing::info!(server, user = %user, "Player logged out");
                self.observer.player_logged_out(&user).await;
            }
            ClassifiedEvent::GameMode { mode } => {
                tracing::info!(server, mode, "Default game mode reported");
            }
            ClassifiedEvent::EulaPrompt => {
                tracing::warn!(server, "EULA not accepted for server, create the EULA file");
                self.observer
                    .configuration_required(ConfigurationRequired::EulaNotAccepted)
                    .await;
            }
        }

        None
    }

    /// Close the session: drop logins that never confirmed, then tell the observer.
    pub(crate) async fn finish(&mut self) {
        let pending = self.correlator.pending_count();
        if pending > 0 {
            tracing::debug!(server = %self.name, pending, "Discarding unconfirmed logins");
        }
        self.correlator.reset();
        self.observer.session_ended().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ChatKind;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recorder {
        logins: Mutex<Vec<(String, Option<String>)>>,
        logouts: Mutex<Vec<String>>,
        chats: Mutex<Vec<(String, String)>>,
        eula: Mutex<usize>,
    }

    #[async_trait]
    impl SessionObserver for Recorder {
        async fn chat(&self, _kind: &ChatKind, user: &str, text: &str) {
            self.chats
                .lock()
                .unwrap()
                .push((user.to_string(), text.to_string()));
        }

        async fn player_logged_in(&self, user: &str, external_id: Option<&str>) {
            self.logins
                .lock()
                .unwrap()
                .push((user.to_string(), external_id.map(str::to_string)));
        }

        async fn player_logged_out(&self, user: &str) {
            self.logouts.lock().unwrap().push(user.to_string());
        }

        async fn configuration_required(&self, _reason: ConfigurationRequired) {
            *self.eula.lock().unwrap() += 1;
        }
    }

    fn dispatcher(observer: Arc<Recorder>) -> (LineDispatcher, Arc<SessionPresence>) {
        let presence = Arc::new(SessionPresence::default());
        let dispatcher = LineDispatcher::new(
            "test".to_string(),
            SessionId::new(),
            Arc::new(ConsoleClassifier::new().unwrap()),
            observer,
            Arc::clone(&presence),
            ServerLifecycleManager::new(),
        );
        (dispatcher, presence)
    }

    fn info(message: &str) -> RawLine {
        RawLine::new(
            format!("[09:00:00] [Server thread/INFO]: {}", message),
            OutputStream::Stdout,
        )
    }

    #[tokio::test]
    async fn test_login_with_uuid() {
        let recorder = Arc::new(Recorder::default());
        let (mut dispatcher, presence) = dispatcher(Arc::clone(&recorder));

        dispatcher.dispatch(info("UUID of player Bob is u1")).await;
        assert!(recorder.logins.lock().unwrap().is_empty());

        dispatcher
            .dispatch(info("Bob[/127.0.0.1:5000] logged in with entity id 3 at (0, 0, 0)"))
            .await;

        assert_eq!(
            *recorder.logins.lock().unwrap(),
            vec![("Bob".to_string(), Some("u1".to_string()))]
        );
        assert_eq!(presence.players(), vec!["Bob".to_string()]);
        assert!(presence.is_dirty());
    }

    #[tokio::test]
    async fn test_finish_discards_unconfirmed_logins() {
        let recorder = Arc::new(Recorder::default());
        let (mut dispatcher, _presence) = dispatcher(Arc::clone(&recorder));

        dispatcher.dispatch(info("UUID of player Dave is u4")).await;
        assert_eq!(dispatcher.correlator.pending_count(), 1);

        dispatcher.finish().await;
        assert_eq!(dispatcher.correlator.pending_count(), 0);
        assert!(recorder.logins.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_login_and_logout() {
        let recorder = Arc::new(Recorder::default());
        let (mut dispatcher, presence) = dispatcher(Arc::clone(&recorder));

        dispatcher
            .dispatch(info("Carol[/10.1.2.3:4000] logged in with entity id 9"))
            .await;
        dispatcher
            .dispatch(info("Carol lost connection: Disconnected"))
            .await;

        assert_eq!(
            *recorder.logins.lock().unwrap(),
            vec![("Carol".to_string(), None)]
        );
        assert_eq!(*recorder.logouts.lock().unwrap(), vec!["Carol".to_string()]);
        assert_eq!(presence.player_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_and_eula_notifications() {
        let recorder = Arc::new(Recorder::default());
        let (mut dispatcher, _) = dispatcher(Arc::clone(&recorder));

        dispatcher.dispatch(info("<Alice> hello")).await;
        dispatcher
            .dispatch(info(
                "You need to agree to the EULA in order to run the server. Go to eula.txt for more info.",
            ))
            .await;

        assert_eq!(
            *recorder.chats.lock().unwrap(),
            vec![("Alice".to_string(), "hello".to_string())]
        );
        assert_eq!(*recorder.eula.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_jar_on_stderr() {
        let recorder = Arc::new(Recorder::default());
        let (mut dispatcher, presence) = dispatcher(recorder);

        let signal = dispatcher
            .dispatch(RawLine::new(
                "Error: Invalid or corrupt jarfile /srv/jar/release_3.jar",
                OutputStream::Stderr,
            ))
            .await;

        assert!(signal.is_some());
        assert!(presence.corrupt_artifact().is_some());
    }

    #[tokio::test]
    async fn test_stdout_noise_is_not_an_error() {
        let recorder = Arc::new(Recorder::default());
        let (mut dispatcher, presence) = dispatcher(recorder);

        let signal = dispatcher
            .dispatch(RawLine::new(
                "Invalid or corrupt jarfile mentioned in a stack trace",
                OutputStream::Stdout,
            ))
            .await;

        assert!(signal.is_none());
        assert!(presence.corrupt_artifact().is_none());
    }
}
