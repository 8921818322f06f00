//! Resumable chunked upload engine.
//!
//! [`ChunkedUploader`] drives a session through start, upload and finalize,
//! asking the server for its confirmed offset before every upload so a
//! transfer survives disconnects and device restarts. [`ChunkTransport`]
//! sends one chunk per request with bounded, fixed-delay retry.
//!
//! ```no_run
//! # async fn run(frame: &[u8]) -> chunklift_client::Result<()> {
//! use chunklift_client::{ChunkedUploader, UploaderConfig};
//!
//! let mut uploader = ChunkedUploader::new(UploaderConfig::new("10.0.0.5", 8080, "cam-01"))?;
//! uploader.start(frame.len() as u64, None).await?;
//! uploader.upload_payload(frame).await?;
//! uploader.finalize().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod session;
pub mod transport;

pub use chunklift_core::{ResumeStatus, SessionId, UploaderConfig};
pub use error::{FailureKind, Result, UploadError};
pub use memory::{MemoryMonitor, MemoryProbe, MemorySample, SystemMemoryProbe};
pub use session::ChunkedUploader;
pub use transport::ChunkTransport;
