use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BunkError {
    #[error("attendance data not found: {path}")]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("malformed attendance data: {0}")]
    MalformedInput(String),

    #[error("invalid record for '{subject}': attended {attended} exceeds held {held}")]
    InvalidRecord {
        subject: String,
        held: u64,
        attended: u64,
    },

    #[error("invalid attendance policy: {0}")]
    Policy(String),
}

impl BunkError {
    pub fn malformed_field(subject: &str, field: &str, problem: &str) -> Self {
        BunkError::MalformedInput(format!("subject '{subject}': field '{field}' {problem}"))
    }

    /// Record-level errors may be skipped with `--skip-invalid`; the rest are fatal.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            BunkError::MalformedInput(_) | BunkError::InvalidRecord { .. }
        )
    }
}
