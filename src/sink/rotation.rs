//! File cursor and the rotation decision.
//!
//! Output files are JSON arrays with one compact document per line:
//!
//! ```text
//! [
//! {"traceId":"..."}
//! ,{"traceId":"..."}
//! ]
//! ```
//!
//! The byte accounting mirrors exactly what [`OpenFile`](super::file_writer::OpenFile)
//! writes, so the decision and the subsequent write always agree:
//!
//! - the opening `[\n` is counted when the file is created
//! - each record costs its encoded length, plus the `\n,` separator unless it
//!   is the first record of the file
//! - the closing `\n]\n` is reserved up front, so a closed file stays within
//!   the limit

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Written when a file is opened.
pub const OPENING: &[u8] = b"[\n";

/// Written before every record except the first one of a file.
pub const SEPARATOR: &[u8] = b"\n,";

/// Written when a file is closed.
pub const CLOSING: &[u8] = b"\n]\n";

/// Length of a byte marker as a file size.
const fn marker_len(marker: &[u8]) -> u64 {
    marker.len() as u64
}

/// The sink's position within the currently open file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCursor {
    path: PathBuf,
    date: NaiveDate,
    size: u64,
    sequence: u32,
    has_records: bool,
}

impl FileCursor {
    /// Cursor for a freshly opened file that holds only the opening marker.
    #[must_use]
    pub fn new(path: PathBuf, date: NaiveDate, sequence: u32) -> Self {
        Self {
            path,
            date,
            size: marker_len(OPENING),
            sequence,
            has_records: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// UTC date the file was opened for.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Bytes written so far, closing marker excluded.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    #[must_use]
    pub const fn has_records(&self) -> bool {
        self.has_records
    }

    /// Bytes a record of `encoded_len` adds to this file, separator included.
    #[must_use]
    pub fn record_cost(&self, encoded_len: usize) -> u64 {
        let separator = if self.has_records { marker_len(SEPARATOR) } else { 0 };
        u64::try_from(encoded_len).unwrap_or(u64::MAX).saturating_add(separator)
    }

    /// Size of the file once closed.
    #[must_use]
    pub fn closed_size(&self) -> u64 {
        self.size.saturating_add(marker_len(CLOSING))
    }

    /// Accounts for a record that has just been written.
    pub fn record_written(&mut self, encoded_len: usize) {
        self.size = self.size.saturating_add(self.record_cost(encoded_len));
        self.has_records = true;
    }
}

/// What to do before writing the next record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateDecision {
    /// Append to the current file.
    Write,
    /// The record would push the closed file past the size limit.
    RotateSize,
    /// The UTC date changed since the file was opened.
    RotateDate,
}

/// Decides whether the next record of `encoded_len` bytes fits the current file.
///
/// A date change always rotates. A size overflow rotates only when the file
/// already holds a record: an oversized record is written alone into a fresh
/// file rather than rotating forever.
///
/// A record is oversized when it does not fit an empty file, that is when
/// `OPENING + encoded_len + CLOSING` exceeds `max_file_size`. Such a record
/// can be shorter than the limit itself; its file still overshoots by at
/// most the framing.
///
/// # Parameters
///
/// * `cursor` - Position within the currently open file
/// * `encoded_len` - Encoded length of the next record, separator excluded
/// * `today` - Current UTC date from the sink's clock
/// * `max_file_size` - Size limit for a closed file, in bytes
///
/// # Returns
///
/// - `RotateDate` if `today` differs from the file's date
/// - `RotateSize` if the file holds a record and the next one would push
///   the closed size past the limit
/// - `Write` otherwise
#[must_use]
pub fn decide(cursor: &FileCursor, encoded_len: usize, today: NaiveDate, max_file_size: u64) -> RotateDecision {
    if today != cursor.date {
        return RotateDecision::RotateDate;
    }

    let projected = cursor
        .size
        .saturating_add(cursor.record_cost(encoded_len))
        .saturating_add(marker_len(CLOSING));

    if cursor.has_records && projected > max_file_size {
        RotateDecision::RotateSize
    } else {
        RotateDecision::Write
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    fn cursor() -> FileCursor {
        FileCursor::new(PathBuf::from("traces_run.json"), day(1), 0)
    }

    #[test]
    fn test_new_cursor_counts_opening() {
        let cursor = cursor();
        assert_eq!(cursor.size(), 2);
        assert!(!cursor.has_records());
        assert_eq!(cursor.closed_size(), 5);
    }

    #[test]
    fn test_first_record_has_no_separator() {
        let mut cursor = cursor();
        assert_eq!(cursor.record_cost(10), 10);
        cursor.record_written(10);
        assert_eq!(cursor.record_cost(10), 12);
        cursor.record_written(10);
        assert_eq!(cursor.size(), 2 + 10 + 12);
    }

    #[test]
    fn test_write_when_record_fits_exactly() {
        let mut cursor = cursor();
        cursor.record_written(10);
        // 2 + 10 + (2 + 10) + 3 = 27
        assert_eq!(decide(&cursor, 10, day(1), 27), RotateDecision::Write);
        assert_eq!(decide(&cursor, 10, day(1), 26), RotateDecision::RotateSize);
    }

    #[test]
    fn test_oversized_record_goes_into_empty_file() {
        let cursor = cursor();
        assert_eq!(decide(&cursor, 1_000, day(1), 100), RotateDecision::Write);
    }

    #[test]
    fn test_record_that_fits_only_without_framing_is_oversized() {
        let mut cursor = cursor();
        // 98 bytes fit a 100-byte limit, but not with 2 + 3 bytes of framing.
        assert_eq!(decide(&cursor, 98, day(1), 100), RotateDecision::Write);
        cursor.record_written(98);
        assert_eq!(cursor.closed_size(), 103);
        assert_eq!(decide(&cursor, 1, day(1), 100), RotateDecision::RotateSize);
    }

    #[test]
    fn test_date_change_wins_over_size() {
        let mut cursor = cursor();
        cursor.record_written(10);
        assert_eq!(decide(&cursor, 1, day(2), 1_000), RotateDecision::RotateDate);
        assert_eq!(decide(&cursor, 1_000, day(2), 10), RotateDecision::RotateDate);
    }
}
