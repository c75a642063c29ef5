//! Console protocol of the wrapped server.
//!
//! Every line the server prints is turned into a [`ClassifiedEvent`] by the
//! [`ConsoleClassifier`]. The patterns are the compatibility contract with the
//! server binary and are kept in one place in `classifier.rs`.
mod classifier;
mod event;

pub use classifier::{ConsoleClassifier, Envelope};
pub use event::{ChatKind, ClassifiedEvent, LogLevel, OutputStream, RawLine};

/// Marker the JVM prints when the server jar cannot be opened.
pub const CORRUPT_ARTIFACT_MARKER: &str = "Invalid or corrupt jarfile ";
