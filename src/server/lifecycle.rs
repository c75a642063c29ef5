use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

/// Maximum number of events kept in the history
const MAX_EVENTS: usize = 1000;

/// Unique identifier of one run of the server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Server started
    Started,
    /// Server exited after a graceful stop
    Stopped,
    /// Server was terminated
    Killed,
    /// Server exited on its own
    Crashed,
    /// Server reported a corrupt jar
    CorruptArtifact,
}

/// Server lifecycle event
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Session the event belongs to
    pub session: SessionId,
    /// Server name
    pub name: String,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: Instant,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of server lifecycle events
#[derive(Clone)]
pub struct ServerLifecycleManager {
    events: Arc<Mutex<VecDeque<ServerEvent>>>,
}

impl ServerLifecycleManager {
    /// Create a new server lifecycle manager
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Record a server event
    pub fn record_event(
        &self,
        session: SessionId,
        name: &str,
        event: ServerLifecycleEvent,
        details: Option<String>,
    ) -> Result<()> {
        tracing::debug!(%session, server = name, ?event, "Recording lifecycle event");

        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.push_back(ServerEvent {
            session,
            name: name.to_string(),
            event,
            timestamp: Instant::now(),
            details,
        });

        while events.len() > MAX_EVENTS {
            events.pop_front();
        }

        Ok(())
    }

    /// Get recent events for a session, newest first
    pub fn get_session_events(
        &self,
        session: SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        let mut session_events: Vec<ServerEvent> = events
            .iter()
            .rev()
            .filter(|e| e.session == session)
            .cloned()
            .collect();

        if let Some(limit) = limit {
            session_events.truncate(limit);
        }

        Ok(session_events)
    }

    /// Get all events, newest first
    pub fn get_all_events(&self, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        let mut all_events: Vec<ServerEvent> = events.iter().rev().cloned().collect();

        if let Some(limit) = limit {
            all_events.truncate(limit);
        }

        Ok(all_events)
    }

    /// Most recent event, if any
    pub fn last_event(&self) -> Result<Option<ServerEvent>> {
        Ok(self.get_all_events(Some(1))?.pop())
    }

    /// Clear events
    pub fn clear_events(&self) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.clear();

        Ok(())
    }
}

impl Default for ServerLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
