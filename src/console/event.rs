use std::time::Instant;

/// Which pipe of the child process a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// A single complete line of child-process output.
#[derive(Debug, Clone)]
pub struct RawLine {
    /// Line text without the trailing newline
    pub text: String,
    /// When the line was read
    pub received_at: Instant,
    /// Pipe the line came from
    pub stream: OutputStream,
}

impl RawLine {
    /// Creates a line stamped with the current time.
    pub fn new(text: impl Into<String>, stream: OutputStream) -> Self {
        Self {
            text: text.into(),
            received_at: Instant::now(),
            stream,
        }
    }
}

/// Severity taken from the log-line envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// `INFO`
    Info,
    /// `WARN`
    Warn,
    /// Any other level
    Error,
}

impl LogLevel {
    pub(crate) fn from_envelope(level: &str) -> Self {
        match level {
            "INFO" => LogLevel::Info,
            "WARN" => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

/// How a chat line was addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatKind {
    /// `<name> text`
    Player,
    /// `[sender->recipient] text`
    Private {
        /// Receiving player
        recipient: String,
    },
    /// `[CONSOLE] text`, `[Server] text` or `<*Console> text`
    Console,
}

/// A classified console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    /// A chat message. For console chat `user` is the console tag without
    /// its brackets, e.g. `Server`.
    Chat {
        /// How the message was addressed
        kind: ChatKind,
        /// Sending player or console tag
        user: String,
        /// Message body with the prefix stripped
        text: String,
    },
    /// A login line. `uuid` is set for the `UUID of player` line and empty for
    /// the plain `logged in with entity id` line.
    PlayerLogin {
        /// Player name
        user: String,
        /// Mojang profile id
        uuid: Option<String>,
    },
    /// A player lost connection.
    PlayerLogout {
        /// Player name
        user: String,
    },
    /// The server's default game mode.
    GameMode {
        /// Numeric game type
        mode: u8,
    },
    /// The server refuses to run until the EULA is accepted.
    EulaPrompt,
    /// A message logged at a level other than INFO or WARN.
    ErrorLine {
        /// Message text
        text: String,
    },
    /// A message logged at WARN.
    WarnLine {
        /// Message text
        text: String,
    },
    /// Anything else. Holds the raw line when the envelope did not match and
    /// the message text otherwise.
    Unclassified {
        /// Unrecognised text
        raw_text: String,
    },
}

impl ClassifiedEvent {
    /// Whether the event came from an error-level message.
    pub fn is_error(&self) -> bool {
        matches!(self, ClassifiedEvent::ErrorLine { .. })
    }
}
