//! Error types for the telemetry file sink.
//!
//! This module defines the centralized error type [`SinkError`] and a type alias
//! [`Result`] used by construction and configuration code. The export path never
//! surfaces these errors to its caller: they are logged and folded into an
//! [`ExportResult`](crate::sink::ExportResult).

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for sink operations.
///
/// Most variants wrap underlying errors using `#[from]` for automatic
/// conversion with `?`.
///
/// # Examples
///
/// ```
/// use telemetry_file_sink::SinkError;
///
/// fn validate() -> Result<(), SinkError> {
///     Err(SinkError::Config("max_file_size_bytes must be positive".to_string()))
/// }
/// assert!(validate().is_err());
/// ```
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem or I/O operation failed while writing telemetry.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record document could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The output directory could not be created at construction time.
    ///
    /// This is fatal to the sink being built; there is nothing to recover
    /// internally.
    #[error("failed to create telemetry directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is invalid or could not be read.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A specialized `Result` type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;
