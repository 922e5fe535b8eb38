//! Per-sink configuration.

use crate::domain::{Result, SinkError};
use crate::infrastructure::{default_telemetry_dir, is_file_name_token};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Default maximum file size before rotation (25 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 25 * 1024 * 1024;

/// Returns the run identifier shared by every sink of this process.
///
/// Derived once from the first call's UTC time as `%Y%m%d_%H%M%S_%3f`, so
/// the traces, logs and metrics files of one run carry the same id.
#[must_use]
pub fn default_run_id() -> &'static str {
    static RUN_ID: OnceLock<String> = OnceLock::new();
    RUN_ID.get_or_init(|| Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string())
}

/// Where and how a sink writes its files.
///
/// # Example
///
/// ```rust
/// use telemetry_file_sink::sink::SinkOptions;
///
/// let options = SinkOptions::for_directory("/tmp/telemetry")
///     .with_max_file_size_mb(5)
///     .with_run_id("nightly");
/// assert_eq!(options.max_file_size_bytes, 5 * 1024 * 1024);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    /// Directory the files are written into; created with parents.
    pub directory: PathBuf,
    /// Size limit that triggers rotation.
    pub max_file_size_bytes: u64,
    /// Identifier embedded in every file name of this run.
    pub run_id: String,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            directory: default_telemetry_dir(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            run_id: default_run_id().to_string(),
        }
    }
}

impl SinkOptions {
    /// Default options writing into `directory`.
    pub fn for_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_file_size_mb(mut self, megabytes: u64) -> Self {
        self.max_file_size_bytes = megabytes.saturating_mul(1024 * 1024);
        self
    }

    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Checks that the options can produce valid file names and a usable limit.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the size limit is zero or the run id
    /// is not a file-name-safe token.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_bytes == 0 {
            return Err(SinkError::Config(
                "max_file_size_bytes must be positive".to_string(),
            ));
        }
        if !is_file_name_token(&self.run_id) {
            return Err(SinkError::Config(format!(
                "run_id {:?} must be non-empty and contain only ASCII letters, digits, '-', '_' or '.'",
                self.run_id
            )));
        }
        Ok(())
    }
}
