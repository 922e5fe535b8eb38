//! Path resolution for telemetry output.
//!
//! This module decides where telemetry files live by default and how an
//! individual output file is named from its kind, run identifier, date and
//! rotation sequence.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Application directory name used under the platform data directory.
const APP_DIR_NAME: &str = "telemetry-file-sink";

/// Returns the default directory for telemetry files.
///
/// Resolves to the platform's per-user local data directory:
///
/// - Linux: `~/.local/share/telemetry-file-sink/telemetry`
/// - macOS: `~/Library/Application Support/telemetry-file-sink/telemetry`
/// - Windows: `%LOCALAPPDATA%\telemetry-file-sink\telemetry`
///
/// Falls back to `./telemetry` when no data directory is known.
#[must_use]
pub fn default_telemetry_dir() -> PathBuf {
    dirs::data_local_dir().map_or_else(
        || PathBuf::from("telemetry"),
        |base| base.join(APP_DIR_NAME).join("telemetry"),
    )
}

/// Builds the file name for one output file.
///
/// # Naming
///
/// - `{kind}_{run_id}.json` for sequence 0
/// - `{kind}_{run_id}_{NNN}.json` for sequence >= 1
/// - `date_tag` inserts `_{YYYYMMDD}` after the run id; the sink passes it
///   for every date after the run's first one.
///
/// # Examples
///
/// ```
/// use telemetry_file_sink::infrastructure::file_name;
///
/// assert_eq!(file_name("traces", "run1", None, 0), "traces_run1.json");
/// assert_eq!(file_name("traces", "run1", None, 7), "traces_run1_007.json");
/// ```
#[must_use]
pub fn file_name(kind: &str, run_id: &str, date_tag: Option<NaiveDate>, sequence: u32) -> String {
    let mut name = format!("{kind}_{run_id}");
    if let Some(date) = date_tag {
        name.push('_');
        name.push_str(&date.format("%Y%m%d").to_string());
    }
    if sequence > 0 {
        name.push_str(&format!("_{sequence:03}"));
    }
    name.push_str(".json");
    name
}

/// Joins [`file_name`] onto a directory.
#[must_use]
pub fn file_path(
    directory: &Path,
    kind: &str,
    run_id: &str,
    date_tag: Option<NaiveDate>,
    sequence: u32,
) -> PathBuf {
    directory.join(file_name(kind, run_id, date_tag, sequence))
}

/// Returns true if `token` can be embedded in a file name unchanged.
///
/// Accepts ASCII alphanumerics plus `-`, `_` and `.`, and rejects empty
/// strings and `.`/`..`.
#[must_use]
pub fn is_file_name_token(token: &str) -> bool {
    !token.is_empty()
        && token != "."
        && token != ".."
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
