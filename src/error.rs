use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtgError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Timestamps are not strictly increasing at index {0}")]
    NonMonotonicTimestamps(usize),

    #[error("Failed to parse recording: {0}")]
    ParseError(String),

    #[error("Recording file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CtgError {
    /// True for errors caused by the caller's parameters rather than the data.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CtgError::InvalidConfiguration(_))
    }
}

pub type Result<T> = std::result::Result<T, CtgError>;

/// Fail with `LengthMismatch` unless `actual == expected`.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CtgError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
