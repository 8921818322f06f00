//! Core protocol types and shared logic for resumable chunked frame uploads.
//!
//! This crate defines the data model used by the upload engine and its callers:
//! - Protocol constants forming the client/server compatibility contract
//! - Uploader configuration
//! - Upload session state and its confirmed-offset invariants
//! - Chunk planning over a borrowed payload
//! - Wire paths, headers and request bodies
//! - A scanning extractor for flat response bodies

pub mod chunk;
pub mod config;
pub mod error;
pub mod protocol;
pub mod response;
pub mod upload;

pub use chunk::Chunk;
pub use config::UploaderConfig;
pub use error::{Error, Result};
pub use response::{ProtocolError, ServerResponse};
pub use upload::{ResumeStatus, SessionId, SessionState, UploadSession};

/// Chunk size agreed with the server: 8 KiB.
pub const CHUNK_SIZE: usize = 8192;

/// Attempts per chunk before the transfer is aborted.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between chunk attempts, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Connect timeout for every exchange, in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
