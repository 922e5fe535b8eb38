//! Domain layer: error types shared by the sink, records and adapters.
//!
//! # Organization
//!
//! - [`error`]: Error types and result aliases

pub mod error;

pub use error::{Result, SinkError};
