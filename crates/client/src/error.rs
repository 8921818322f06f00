//! Upload error taxonomy.

use chunklift_core::ProtocolError;
use thiserror::Error;

/// Broad failure classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, refused connection, dropped connection.
    Connectivity,
    /// Malformed or unparsable response, or an offset the protocol forbids.
    Protocol,
    /// Well-formed response reporting failure, or a non-success HTTP status.
    Rejection,
    /// Finalize reported the payload as unverified.
    Integrity,
    /// The operation was called in a state that does not allow it.
    Usage,
}

/// Errors returned by the upload engine.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("connection failed: {0}")]
    Connectivity(#[from] reqwest::Error),

    #[error("malformed server response: {0}")]
    Protocol(String),

    #[error("server rejected {operation} ({status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("server could not verify payload integrity for session {session_id}")]
    Integrity { session_id: String },

    #[error("chunk at offset {offset} failed after {attempts} attempts: {last}")]
    ChunkExhausted {
        offset: u64,
        attempts: u32,
        #[source]
        last: Box<UploadError>,
    },

    #[error("server does not recognise session {0}; start a new session")]
    UnknownSession(String),

    #[error("no upload session; call start first")]
    NoSession,

    #[error("upload incomplete: {confirmed} of {total} bytes confirmed")]
    Incomplete { confirmed: u64, total: u64 },

    #[error("payload is {actual} bytes but the session expects {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Session(#[from] chunklift_core::Error),
}

impl UploadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connectivity(_) => FailureKind::Connectivity,
            Self::Protocol(_) => FailureKind::Protocol,
            Self::Rejected { .. } => FailureKind::Rejection,
            Self::Integrity { .. } => FailureKind::Integrity,
            Self::ChunkExhausted { last, .. } => last.kind(),
            Self::Session(
                chunklift_core::Error::OffsetRegression { .. }
                | chunklift_core::Error::OffsetOutOfRange { .. },
            ) => FailureKind::Protocol,
            Self::UnknownSession(_)
            | Self::NoSession
            | Self::Incomplete { .. }
            | Self::SizeMismatch { .. }
            | Self::Session(_) => FailureKind::Usage,
        }
    }
}

impl From<ProtocolError> for UploadError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;
