//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid total size: {0} (must be greater than zero)")]
    InvalidSize(u64),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("confirmed offset would regress from {current} to {reported}")]
    OffsetRegression { current: u64, reported: u64 },

    #[error("confirmed offset {reported} exceeds total size {total}")]
    OffsetOutOfRange { reported: u64, total: u64 },

    #[error("upload session {id} is {state}, not open")]
    SessionClosed { id: String, state: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
