//! Generic rotating JSON file sink.
//!
//! One [`FileSink`] instance is dedicated to one record kind. The whole
//! export path (rotation decision, write, flush) and the shutdown path run
//! under a single mutex, so batches of one kind never interleave within a
//! file while sinks of different kinds proceed independently.
//!
//! # Lifecycle
//!
//! ```text
//! Closed --first record--> Open --size/date--> Open (next file)
//!   ^                        |
//!   +-------shutdown---------+
//! ```
//!
//! A closed sink reopens on the next export as if it were new: today's
//! date, sequence 0, skipping names that already exist.

use super::clock::{Clock, SystemClock};
use super::file_writer::{FileFamily, OpenFile};
use super::options::SinkOptions;
use super::rotation::{decide, RotateDecision};
use super::ExportResult;
use crate::domain::{Result, SinkError};
use crate::records::TelemetryRecord;
use chrono::NaiveDate;
use opentelemetry_sdk::Resource;
use std::io;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Mutable state guarded by the sink's lock.
#[derive(Debug, Default)]
struct SinkState {
    /// `None` while closed.
    file: Option<OpenFile>,
    /// UTC date of the first file this sink opened; later dates are tagged
    /// in file names.
    first_date: Option<NaiveDate>,
    /// Number of files opened so far.
    files_opened: u64,
}

/// Thread-safe sink appending records of one kind to rotating JSON files.
///
/// # Example
///
/// ```no_run
/// use telemetry_file_sink::records::MetricPoint;
/// use telemetry_file_sink::sink::{FileSink, SinkOptions};
///
/// let sink: FileSink<MetricPoint> =
///     FileSink::new(SinkOptions::for_directory("/tmp/telemetry"), None)?;
/// let result = sink.export(&[]);
/// assert!(result.is_success());
/// sink.shutdown(std::time::Duration::from_secs(1));
/// # Ok::<(), telemetry_file_sink::SinkError>(())
/// ```
pub struct FileSink<R: TelemetryRecord> {
    options: SinkOptions,
    resource: Option<Resource>,
    clock: Arc<dyn Clock>,
    state: Mutex<SinkState>,
    _record: PhantomData<fn(&R)>,
}

impl<R: TelemetryRecord> FileSink<R> {
    /// Creates a sink and its output directory.
    ///
    /// No file is opened until the first record arrives.
    ///
    /// # Parameters
    ///
    /// * `options` - Output directory, run id and size limit
    /// * `resource` - Resource attached to every document, or `None`
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] for invalid options and
    /// [`SinkError::CreateDirectory`] if the directory cannot be created.
    pub fn new(options: SinkOptions, resource: Option<Resource>) -> Result<Self> {
        options.validate()?;

        tracing::debug!(
            kind = %R::KIND,
            directory = ?options.directory,
            run_id = %options.run_id,
            max_file_size_bytes = options.max_file_size_bytes,
            "creating telemetry file sink"
        );

        std::fs::create_dir_all(&options.directory).map_err(|source| SinkError::CreateDirectory {
            path: options.directory.clone(),
            source,
        })?;

        Ok(Self {
            options,
            resource,
            clock: Arc::new(SystemClock),
            state: Mutex::new(SinkState::default()),
            _record: PhantomData,
        })
    }

    /// Replaces the time source used for date rotation.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn options(&self) -> &SinkOptions {
        &self.options
    }

    /// Path of the currently open file, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock_state()
            .file
            .as_ref()
            .map(|file| file.cursor().path().to_path_buf())
    }

    /// Number of files this sink has opened.
    #[must_use]
    pub fn files_opened(&self) -> u64 {
        self.lock_state().files_opened
    }

    /// Appends a batch of records.
    ///
    /// The batch is written under the sink's lock, so it lands contiguously
    /// even if rotation splits it across files. Records written before a
    /// failure stay in the file. An empty batch succeeds without touching
    /// the filesystem.
    ///
    /// # Parameters
    ///
    /// * `batch` - Records to append, in delivery order
    ///
    /// # Returns
    ///
    /// - `ExportResult::Success` if every record was written and flushed
    /// - `ExportResult::Failure` on any I/O error, which is logged; the
    ///   open file is dropped and the next export starts a fresh one
    pub fn export(&self, batch: &[R]) -> ExportResult {
        if batch.is_empty() {
            return ExportResult::Success;
        }

        let mut state = self.lock_state();
        match self.write_batch(&mut state, batch) {
            Ok(written) => {
                tracing::trace!(kind = %R::KIND, written, "exported telemetry batch");
                ExportResult::Success
            }
            Err(e) => {
                // Drop the handle; the next export starts a fresh file.
                state.file = None;
                tracing::error!(kind = %R::KIND, error = %e, batch_size = batch.len(), "telemetry export failed");
                ExportResult::Failure
            }
        }
    }

    /// Flushes the open file, if any.
    pub fn force_flush(&self) -> ExportResult {
        let mut state = self.lock_state();
        let Some(file) = state.file.as_mut() else {
            return ExportResult::Success;
        };
        match file.flush() {
            Ok(()) => ExportResult::Success,
            Err(e) => {
                tracing::error!(kind = %R::KIND, error = %e, "telemetry flush failed");
                ExportResult::Failure
            }
        }
    }

    /// Closes the open file.
    ///
    /// Idempotent and best-effort: close errors are logged and swallowed.
    /// A later export reopens the sink into a new file.
    ///
    /// # Parameters
    ///
    /// * `timeout` - Advisory; closing is a bounded amount of synchronous work
    ///
    /// # Returns
    ///
    /// Always `true`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let _ = timeout;
        let mut state = self.lock_state();
        if let Some(file) = state.file.take() {
            match file.close() {
                Ok(path) => tracing::debug!(kind = %R::KIND, path = ?path, "telemetry file closed"),
                Err(e) => tracing::warn!(kind = %R::KIND, error = %e, "failed to close telemetry file"),
            }
        }
        true
    }

    /// Locks the state, recovering it if a previous holder panicked.
    fn lock_state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_batch(&self, state: &mut SinkState, batch: &[R]) -> Result<usize> {
        let mut written = 0;

        for record in batch {
            let encoded = match self.encode(record) {
                Ok(encoded) => encoded,
                Err(e) => {
                    tracing::warn!(kind = %R::KIND, error = %e, "skipping record that failed to encode");
                    continue;
                }
            };

            let today = self.clock.now().date_naive();
            let file = self.file_for(state, encoded.len(), today)?;
            file.write_record(&encoded)?;
            written += 1;
        }

        if let Some(file) = state.file.as_mut() {
            file.flush()?;
        }

        Ok(written)
    }

    /// Encodes one record as a compact JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Serialize`] if the document cannot be encoded.
    fn encode(&self, record: &R) -> Result<Vec<u8>> {
        let document = record.to_document(self.resource.as_ref());
        Ok(serde_json::to_vec(&document)?)
    }

    /// Returns the file the next record goes into, rotating or opening first
    /// when needed.
    fn file_for<'s>(&self, state: &'s mut SinkState, encoded_len: usize, today: NaiveDate) -> Result<&'s mut OpenFile> {
        let next = match state.file.as_ref() {
            None => Some((today, 0)),
            Some(file) => {
                let cursor = file.cursor();
                match decide(cursor, encoded_len, today, self.options.max_file_size_bytes) {
                    RotateDecision::Write => None,
                    RotateDecision::RotateSize => Some((cursor.date(), cursor.sequence().saturating_add(1))),
                    RotateDecision::RotateDate => Some((today, 0)),
                }
            }
        };

        if let Some((date, sequence)) = next {
            if let Some(previous) = state.file.take() {
                let path = previous.close()?;
                tracing::debug!(kind = %R::KIND, path = ?path, "rotated telemetry file");
            }

            let first_date = *state.first_date.get_or_insert(date);
            let family = FileFamily {
                directory: &self.options.directory,
                kind: R::KIND.as_str(),
                run_id: &self.options.run_id,
            };
            let file = OpenFile::create(family, date, (date != first_date).then_some(date), sequence)?;
            tracing::debug!(kind = %R::KIND, path = ?file.cursor().path(), "opened telemetry file");

            state.files_opened += 1;
            state.file = Some(file);
        }

        state
            .file
            .as_mut()
            .ok_or_else(|| SinkError::Io(io::Error::new(io::ErrorKind::Other, "no telemetry file open")))
    }
}

impl<R: TelemetryRecord> Drop for FileSink<R> {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

impl<R: TelemetryRecord> std::fmt::Debug for FileSink<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("kind", &R::KIND)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
