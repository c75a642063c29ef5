use super::event::{ChatKind, ClassifiedEvent, LogLevel};
use crate::error::{Error, Result};
use regex::{Captures, Regex};

/// Envelope of every server log line: `[HH:MM:SS] [thread/LEVEL]: message`.
const ENVELOPE: &str =
    r"^\[(?P<time>\d{2}:\d{2}:\d{2})\] \[(?P<thread>[\w\s#-]+)/(?P<level>[A-Z]+)\]: (?P<msg>.+)$";

/// Chat prefixes, in priority order.
const CHAT_PATTERNS: [(ChatPattern, &str); 3] = [
    (ChatPattern::Player, r"^<(?P<user>[\w~-]+)>"),
    (ChatPattern::Private, r"^\[(?P<user>\w+)->(?P<recipient>\w+)\]"),
    (ChatPattern::Console, r"^(?:\[CONSOLE\]|\[Server\]|<\*Console>)"),
];

/// Non-chat INFO messages, in priority order.
const INFO_PATTERNS: [(InfoPattern, &str); 5] = [
    (InfoPattern::Uuid, r"^UUID of player (?P<user>\w+) is (?P<uuid>[\w-]+)"),
    // IPv4 peers only, matching what the server prints
    (
        InfoPattern::Login,
        r"^(?P<user>\w+)\s*\[/[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+:[0-9]+\] logged in with entity id",
    ),
    (InfoPattern::Logout, r"^(?P<user>\w+) ?lost connection"),
    (InfoPattern::GameMode, r"^Default game type: (?P<mode>[0-9])"),
    (InfoPattern::Eula, r" EULA (.*) eula\.txt "),
];

#[derive(Debug, Clone, Copy)]
enum ChatPattern {
    Player,
    Private,
    Console,
}

#[derive(Debug, Clone, Copy)]
enum InfoPattern {
    Uuid,
    Login,
    Logout,
    GameMode,
    Eula,
}

/// The parts of a line that matched the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// `HH:MM:SS` timestamp printed by the server
    pub time: &'a str,
    /// Logging thread, e.g. `Server thread`
    pub thread: &'a str,
    /// Mapped severity
    pub level: LogLevel,
    /// Message after the `]: ` separator
    pub message: &'a str,
}

/// Turns server console lines into [`ClassifiedEvent`]s.
///
/// The classifier holds nothing but compiled patterns; the same line always
/// produces the same event.
///
/// # Examples
///
/// ```
/// use craft_warden::console::{ChatKind, ClassifiedEvent, ConsoleClassifier};
///
/// let classifier = ConsoleClassifier::new().unwrap();
/// let event = classifier.classify("[12:00:01] [Server thread/INFO]: <Alice> hello");
///
/// assert_eq!(
///     event,
///     ClassifiedEvent::Chat {
///         kind: ChatKind::Player,
///         user: "Alice".to_string(),
///         text: "hello".to_string(),
///     }
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ConsoleClassifier {
    envelope: Regex,
    chat: Vec<(ChatPattern, Regex)>,
    info: Vec<(InfoPattern, Regex)>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::Other(format!("Invalid console pattern '{}': {}", pattern, e)))
}

impl ConsoleClassifier {
    /// Compiles the console patterns.
    pub fn new() -> Result<Self> {
        let chat = CHAT_PATTERNS
            .iter()
            .map(|(tag, pattern)| Ok((*tag, compile(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        let info = INFO_PATTERNS
            .iter()
            .map(|(tag, pattern)| Ok((*tag, compile(pattern)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            envelope: compile(ENVELOPE)?,
            chat,
            info,
        })
    }

    /// Splits a line into its envelope parts, if it has one.
    pub fn envelope<'a>(&self, line: &'a str) -> Option<Envelope<'a>> {
        let caps = self.envelope.captures(line)?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();

        Some(Envelope {
            time: group("time"),
            thread: group("thread"),
            level: LogLevel::from_envelope(group("level")),
            message: caps.name("msg").map(|m| m.as_str()).unwrap_or_default(),
        })
    }

    /// Classifies one complete console line.
    pub fn classify(&self, line: &str) -> ClassifiedEvent {
        let Some(envelope) = self.envelope(line) else {
            return ClassifiedEvent::Unclassified {
                raw_text: line.to_string(),
            };
        };

        match envelope.level {
            LogLevel::Error => ClassifiedEvent::ErrorLine {
                text: envelope.message.to_string(),
            },
            LogLevel::Warn => ClassifiedEvent::WarnLine {
                text: envelope.message.to_string(),
            },
            LogLevel::Info => self
                .classify_chat(envelope.message)
                .or_else(|| self.classify_info(envelope.message))
                .unwrap_or_else(|| ClassifiedEvent::Unclassified {
                    raw_text: envelope.message.to_string(),
                }),
        }
    }

    fn classify_chat(&self, message: &str) -> Option<ClassifiedEvent> {
        self.chat.iter().find_map(|(tag, regex)| {
            let caps = regex.captures(message)?;
            let prefix = caps.get(0)?;
            let text = message[prefix.end()..].trim().to_string();

            let (kind, user) = match tag {
                ChatPattern::Player => (ChatKind::Player, capture(&caps, "user")),
                ChatPattern::Private => (
                    ChatKind::Private {
                        recipient: capture(&caps, "recipient"),
                    },
                    capture(&caps, "user"),
                ),
                ChatPattern::Console => {
                    let tag = prefix.as_str();
                    (ChatKind::Console, tag[1..tag.len() - 1].to_string())
                }
            };

            Some(ClassifiedEvent::Chat { kind, user, text })
        })
    }

    fn classify_info(&self, message: &str) -> Option<ClassifiedEvent> {
        self.info.iter().find_map(|(tag, regex)| {
            let caps = regex.captures(message)?;

            match tag {
                InfoPattern::Uuid => Some(ClassifiedEvent::PlayerLogin {
                    user: capture(&caps, "user"),
                    uuid: Some(capture(&caps, "uuid")),
                }),
                InfoPattern::Login => Some(ClassifiedEvent::PlayerLogin {
                    user: capture(&caps, "user"),
                    uuid: None,
                }),
                InfoPattern::Logout => Some(ClassifiedEvent::PlayerLogout {
                    user: capture(&caps, "user"),
                }),
                InfoPattern::GameMode => capture(&caps, "mode")
                    .parse()
                    .ok()
                    .map(|mode| ClassifiedEvent::GameMode { mode }),
                InfoPattern::Eula => Some(ClassifiedEvent::EulaPrompt),
            }
        })
    }
}

fn capture(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
