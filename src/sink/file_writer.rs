//! Scoped handle for one output file.
//!
//! An [`OpenFile`] owns the file handle together with its [`FileCursor`].
//! Closing writes the array's closing marker and flushes; `Drop` does the
//! same on any path that did not close explicitly, so a handle is always
//! released with a well-formed file behind it.

use super::rotation::{FileCursor, CLOSING, OPENING, SEPARATOR};
use crate::infrastructure::file_path;
use chrono::NaiveDate;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Identifies the family of files a sink writes.
#[derive(Debug, Clone, Copy)]
pub struct FileFamily<'a> {
    pub directory: &'a Path,
    pub kind: &'a str,
    pub run_id: &'a str,
}

/// An output file accepting records.
pub struct OpenFile {
    file: File,
    cursor: FileCursor,
    closed: bool,
}

impl OpenFile {
    /// Creates the next unused file of `family` for `date` and writes the
    /// opening marker.
    ///
    /// Starts at `sequence` and moves up while a candidate name already
    /// exists. Files are created with `create_new`, so an existing file is
    /// never appended to.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be created or the opening marker
    /// cannot be written.
    pub fn create(
        family: FileFamily<'_>,
        date: NaiveDate,
        date_tag: Option<NaiveDate>,
        sequence: u32,
    ) -> io::Result<Self> {
        let mut sequence = sequence;
        loop {
            let path = file_path(family.directory, family.kind, family.run_id, date_tag, sequence);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(OPENING)?;
                    return Ok(Self {
                        file,
                        cursor: FileCursor::new(path, date, sequence),
                        closed: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = ?path, "telemetry file exists, trying next sequence");
                    sequence = sequence.checked_add(1).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::Other, "rotation sequence exhausted")
                    })?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[must_use]
    pub const fn cursor(&self) -> &FileCursor {
        &self.cursor
    }

    /// Appends one encoded document, preceded by a separator when needed.
    ///
    /// The separator and document go out in a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the file may then hold a partial
    /// record and should be dropped.
    pub fn write_record(&mut self, encoded: &[u8]) -> io::Result<()> {
        if self.cursor.has_records() {
            let mut buffer = Vec::with_capacity(SEPARATOR.len() + encoded.len());
            buffer.extend_from_slice(SEPARATOR);
            buffer.extend_from_slice(encoded);
            self.file.write_all(&buffer)?;
        } else {
            self.file.write_all(encoded)?;
        }
        self.cursor.record_written(encoded.len());
        Ok(())
    }

    /// Flushes written records to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Writes the closing marker, flushes, and releases the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the closing marker cannot be written or flushed.
    pub fn close(mut self) -> io::Result<PathBuf> {
        self.finish()?;
        Ok(self.cursor.path().to_path_buf())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.file.write_all(CLOSING)?;
        self.file.flush()
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(path = ?self.cursor.path(), error = %e, "failed to close telemetry file");
        }
    }
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFile")
            .field("cursor", &self.cursor)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
