// ⚠️ Error taxonomy
// Line-level failures are values (MalformedRecord); only sink failures are fatal

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::records::SchemaTag;

/// A single input line that failed parsing or range validation.
///
/// Local to one line: it is counted, optionally routed to the dead-letter
/// output, and never aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("malformed {schema} record (line {line_number}, field {field}): {reason}")]
pub struct MalformedRecord {
    pub schema: SchemaTag,
    pub line_number: usize,
    pub field: String,
    pub reason: String,
    pub line: String,
}

impl MalformedRecord {
    pub fn new(schema: SchemaTag, line: &str, field: &str, reason: impl Into<String>) -> Self {
        MalformedRecord {
            schema,
            line_number: 0,
            field: field.to_string(),
            reason: reason.into(),
            line: line.to_string(),
        }
    }

    /// Builder: attach the 1-based position of the line in its source
    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }
}

#[derive(Error, Debug)]
pub enum FitJoinError {
    #[error(transparent)]
    Malformed(#[from] MalformedRecord),

    /// Input cannot be read or output cannot be written
    #[error("sink unavailable ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration ({}): {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("worker for partition {0} panicked")]
    WorkerPanicked(usize),
}

impl FitJoinError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FitJoinError::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort the run; malformed lines never do
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FitJoinError::Malformed(_))
    }
}

pub type Result<T> = std::result::Result<T, FitJoinError>;
