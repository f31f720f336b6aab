//! Classified failures of a sampling run. Everything else surfaces as an
//! `anyhow` I/O error with the offending path attached as context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    /// Invalid option combination or value; raised before any pass over the data.
    #[error("configuration error: {0}")]
    Config(String),

    /// Required source files are not present in the data directory.
    #[error("missing source files in {dir}: {}", .names.join(", "))]
    MissingSource { dir: PathBuf, names: Vec<String> },

    /// A row could not be coerced to the declared schema. Aborts the current pass.
    #[error("parse error in {} at line {line}: {message}", .path.display())]
    Parse { path: PathBuf, line: u64, message: String },
}

impl SampleError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
