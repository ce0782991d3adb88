/// Error handling module for the srcds controller.
///
/// This module defines the error types used throughout the library.
/// Each variant corresponds to one failure class of the checker or the
/// runner, so callers (and the command channel's HTTP mapping) can react to
/// the class rather than to the message.
///
/// # Example
///
/// ```
/// use srcds_controller::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Command delivered"),
///         Err(Error::Unauthorized(who)) => println!("Access denied: {}", who),
///         Err(Error::Console(msg)) => println!("Console not writable: {}", msg),
///         Err(Error::Timeout(msg)) => println!("Operation timed out: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the srcds-controller library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parses but contains invalid values.
    ///
    /// This error occurs when:
    /// - A server has no name, or two servers share a name
    /// - A check limit has actions but no threshold
    /// - The splay range is inverted
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Error when starting, signalling or waiting for the supervised process.
    #[error("Server process error: {0}")]
    Process(String),

    /// Writing to the supervised process console failed.
    ///
    /// The process may simply be exiting; the command channel reports this
    /// as a conflict rather than a server error.
    #[error("Console write failed: {0}")]
    Console(String),

    /// The caller of the command channel is not allowed by the server ACL,
    /// or its identity could not be established.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A command channel request was missing a required parameter.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested server is not part of the configuration.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// The container runtime rejected an operation or its event stream broke.
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// The incident service could not be reached or answered unexpectedly.
    #[error("Notification error: {0}")]
    Notify(String),

    /// RCON protocol or authentication failure.
    #[error("RCON error: {0}")]
    Rcon(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for srcds-controller operations.
pub type Result<T> = std::result::Result<T, Error>;
