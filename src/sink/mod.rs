//! Rotating JSON file sink.
//!
//! # Modules
//!
//! - [`file_sink`]: the generic, lock-protected sink and its export/shutdown contract
//! - [`rotation`]: file cursor and the pure rotation decision
//! - [`file_writer`]: scoped handle for one output file
//! - [`options`]: directory, size limit and run identifier
//! - [`clock`]: time source, with a manual clock for tests

pub mod clock;
pub mod file_sink;
pub mod file_writer;
pub mod options;
pub mod rotation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file_sink::FileSink;
pub use options::{default_run_id, SinkOptions, DEFAULT_MAX_FILE_SIZE_BYTES};
pub use rotation::{decide, FileCursor, RotateDecision};

/// Outcome of an export call as seen by the upstream pipeline.
///
/// The pipeline decides whether to retry or drop a failed batch; the sink
/// never retries on its own.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportResult {
    Success,
    Failure,
}

impl ExportResult {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
