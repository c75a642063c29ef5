/// Error handling module for Craft Warden.
///
/// This module defines the error types used throughout the library.
/// Lifecycle misuse, configuration problems, version selection failures and
/// process communication failures each get their own variant so callers can
/// react to them individually.
///
/// # Example
///
/// ```
/// use craft_warden::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::AlreadyRunning) => println!("Server is already running"),
///         Err(Error::CorruptArtifact(detail)) => println!("Replace the server jar: {}", detail),
///         Err(Error::Communication(msg)) => println!("Communication error: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use crate::version::ServerType;
use thiserror::Error;

/// Errors that can occur in the craft-warden library.
///
/// Each variant includes context information to help diagnose and handle
/// the error appropriately.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON or YAML is malformed
    /// - Required fields are missing or have the wrong type
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - Assigned memory is below the 512 MB minimum
    /// - The `server-port` parameter is missing or zero
    /// - No server version has been selected for the instance
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Error when starting, stopping, or waiting on the server process.
    #[error("Server process error: {0}")]
    Process(String),

    /// Error while writing to or reading from the server process.
    ///
    /// This error ends the current session: the supervisor is back in
    /// `Stopped` when it is returned.
    #[error("Communication error: {0}")]
    Communication(String),

    /// The server is already running.
    ///
    /// This error occurs when:
    /// - Attempting to start a server that is not in the `Stopped` state
    #[error("Already running")]
    AlreadyRunning,

    /// The server is not running.
    ///
    /// This error occurs when:
    /// - Attempting to stop a server that is already stopped
    /// - Sending an administrative command to a stopped server
    #[error("Not running")]
    NotRunning,

    /// The server reported that its jar file is invalid or corrupt.
    ///
    /// The server has been force-stopped and will refuse to start until the
    /// artifact is replaced.
    #[error("Corrupt server artifact: {0}")]
    CorruptArtifact(String),

    /// An update was requested to a version of a different server type.
    #[error(
        "Version #{version_id} is of type {requested}, but the server is configured for {configured}"
    )]
    VersionTypeMismatch {
        /// Catalog id of the requested version
        version_id: i64,
        /// Server type recorded for the requested version
        requested: ServerType,
        /// Server type the instance is configured for
        configured: ServerType,
    },

    /// The requested version is not known to the version catalog.
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Error in serializing or deserializing data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for craft-warden operations.
pub type Result<T> = std::result::Result<T, Error>;
