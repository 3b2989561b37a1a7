/// Error handling module for Server Host.
///
/// This module defines the error types used throughout the library.
/// Control actions surface these to the caller; staging problems and
/// corrupt records are absorbed and only logged.
///
/// # Example
///
/// ```
/// use server_host::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::NotFound(name)) => println!("Server '{}' does not exist", name),
///         Err(Error::AlreadyRunning(name)) => println!("Server '{}' is already running", name),
///         Err(Error::TerminationFailure { pid, .. }) => println!("Process {} survived", pid),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the server-host library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse the host configuration from a file or string.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The host configuration parsed but holds unusable values.
    ///
    /// This error occurs when:
    /// - The runtime has no interpreter, extension or entrypoints
    /// - A window or retry count is zero
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The server directory does not exist.
    #[error("Server '{0}' not found")]
    NotFound(String),

    /// A server with the same filesystem name already exists for the tenant.
    #[error("Server '{0}' already exists")]
    AlreadyExists(String),

    /// A process is already registered for the server.
    #[error("Server '{0}' is already running")]
    AlreadyRunning(String),

    /// A tenant, server or upload name cannot be used as a path component.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// The operating system refused to launch the server process.
    #[error("Failed to start process: {0}")]
    SpawnFailure(String),

    /// Dependency installation exceeded its time bound.
    ///
    /// Staging treats this as non-fatal; it is logged and the start continues.
    #[error("Dependency installation timed out after {0:?}")]
    StagingTimeout(std::time::Duration),

    /// No entrypoint was found and placeholder synthesis is disabled.
    #[error("No entrypoint found in {0}")]
    NoEntrypoint(String),

    /// The process survived a forceful kill.
    ///
    /// The registry entry is cleared regardless, so `pid` may be an orphan.
    #[error("Process {pid} of server '{server}' did not terminate")]
    TerminationFailure {
        /// Server name
        server: String,
        /// OS process id that is still alive
        pid: u32,
    },

    /// The server directory could not be removed within the retry bound.
    #[error("Failed to delete server directory after {attempts} attempts: {reason}")]
    DeleteFailed {
        /// Number of removal attempts made
        attempts: u32,
        /// Last failure reason
        reason: String,
    },

    /// A persisted record could not be parsed.
    ///
    /// The config store replaces corrupt records with defaults, so this
    /// never reaches callers of control actions.
    #[error("Corrupt server record: {0}")]
    CorruptConfig(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for server-host operations.
pub type Result<T> = std::result::Result<T, Error>;
