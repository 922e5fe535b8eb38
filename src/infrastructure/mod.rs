//! Infrastructure layer for filesystem interactions.
//!
//! This module provides the platform-specific default output directory and
//! the naming scheme for rotated telemetry files.

pub mod paths;

pub use paths::{default_telemetry_dir, file_name, file_path, is_file_name_token};
