//! Session lifecycle: start, resume, upload, finalize.

use crate::error::{Result, UploadError};
use crate::memory::{MemoryMonitor, MemoryProbe, SystemMemoryProbe};
use crate::transport::ChunkTransport;
use chunklift_core::chunk::chunk_count;
use chunklift_core::{Chunk, ResumeStatus, SessionId, UploadSession, UploaderConfig};

/// Resumable chunked uploader for a single payload at a time.
///
/// The server's confirmed offset is authoritative: every upload call asks the
/// server where to continue instead of trusting local progress, which a power
/// loss can wipe out. Start, status and finalize are never retried here;
/// retrying a failed start is the caller's decision.
#[derive(Debug)]
pub struct ChunkedUploader {
    config: UploaderConfig,
    transport: ChunkTransport,
    session: Option<UploadSession>,
    memory: MemoryMonitor,
}

impl ChunkedUploader {
    pub fn new(config: UploaderConfig) -> Result<Self> {
        config.validate()?;
        let transport = ChunkTransport::new(&config)?;
        let memory = if config.memory_diagnostics {
            MemoryMonitor::new(SystemMemoryProbe)
        } else {
            MemoryMonitor::disabled()
        };
        Ok(Self {
            config,
            transport,
            session: None,
            memory,
        })
    }

    /// Replace the memory probe. Ignored when memory diagnostics are off.
    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        if self.config.memory_diagnostics {
            self.memory = MemoryMonitor::new(probe);
        }
        self
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    /// Identifier of the current session, for the caller to persist.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(UploadSession::id)
    }

    pub fn bytes_confirmed(&self) -> u64 {
        self.session.as_ref().map_or(0, UploadSession::bytes_confirmed)
    }

    pub fn total_size(&self) -> u64 {
        self.session.as_ref().map_or(0, UploadSession::total_size)
    }

    /// Completion percentage in `[0, 100]`.
    pub fn progress(&self) -> f32 {
        self.session.as_ref().map_or(0.0, UploadSession::progress)
    }

    /// Register a new session for `total_size` bytes.
    ///
    /// On failure the current session, if any, is left untouched.
    pub async fn start(&mut self, total_size: u64, integrity_hash: Option<&str>) -> Result<SessionId> {
        if total_size == 0 {
            return Err(chunklift_core::Error::InvalidSize(total_size).into());
        }

        self.memory.snapshot("start:before");
        let started = self
            .transport
            .start_session(&self.config.device_id, total_size, integrity_hash)
            .await;
        self.memory.snapshot("start:after");
        let session_id = started?;

        if let Some(previous) = self.session.as_mut()
            && previous.state().is_active()
        {
            tracing::warn!(session_id = %previous.id(), "abandoning open session");
            previous.abandon();
        }

        tracing::info!(
            session_id = %session_id,
            device_id = %self.config.device_id,
            total_size,
            "upload session started"
        );
        self.session = Some(UploadSession::new(
            session_id.clone(),
            total_size,
            integrity_hash.map(str::to_string),
        ));
        Ok(session_id)
    }

    /// Attach to a session persisted before a restart.
    ///
    /// No request is made; the next status query or upload asks the server
    /// how far the session got.
    pub fn resume_session(&mut self, session_id: SessionId, total_size: u64) -> Result<()> {
        if total_size == 0 {
            return Err(chunklift_core::Error::InvalidSize(total_size).into());
        }
        tracing::info!(session_id = %session_id, total_size, "resuming upload session");
        self.session = Some(UploadSession::resumed(session_id, total_size));
        Ok(())
    }

    /// Ask the server how many bytes it has confirmed and adopt that offset.
    ///
    /// [`ResumeStatus::Unknown`] means the server forgot the session (for
    /// example after a restart with a stale identifier); the caller restarts
    /// from zero with [`start`](Self::start).
    pub async fn query_resume_status(&mut self) -> Result<ResumeStatus> {
        let session = self.session.as_mut().ok_or(UploadError::NoSession)?;
        session.ensure_open()?;

        let status = self.transport.query_status(session.id()).await?;
        match status {
            ResumeStatus::Resume(offset) => {
                session.confirm(offset)?;
                tracing::debug!(session_id = %session.id(), resume_offset = offset, "resume status");
            }
            ResumeStatus::Unknown => {
                tracing::warn!(session_id = %session.id(), "server does not know session");
            }
        }
        Ok(status)
    }

    /// Upload `payload` from the server's resume offset to the end.
    ///
    /// Chunks go out strictly in order. A chunk that exhausts its attempts
    /// aborts the call; confirmed progress is kept and a later call picks up
    /// where the server left off.
    pub async fn upload_payload(&mut self, payload: &[u8]) -> Result<()> {
        let session = self.session.as_ref().ok_or(UploadError::NoSession)?;
        session.ensure_open()?;
        let actual = payload.len() as u64;
        if actual != session.total_size() {
            return Err(UploadError::SizeMismatch {
                expected: session.total_size(),
                actual,
            });
        }

        let mut offset = match self.query_resume_status().await? {
            ResumeStatus::Resume(offset) => offset,
            ResumeStatus::Unknown => {
                let id = self.session_id().map(ToString::to_string).unwrap_or_default();
                return Err(UploadError::UnknownSession(id));
            }
        };

        let chunk_size = self.config.chunk_size;
        let Some(session) = self.session.as_mut() else {
            return Err(UploadError::NoSession);
        };
        tracing::info!(
            session_id = %session.id(),
            resume_offset = offset,
            total_size = session.total_size(),
            chunks = chunk_count(session.remaining(), chunk_size),
            "uploading payload"
        );

        while let Some(chunk) = Chunk::at(payload, offset, chunk_size) {
            self.memory.snapshot("chunk:before");
            let sent = self.transport.send_with_retry(session.id(), chunk).await;
            self.memory.snapshot("chunk:after");

            let next = sent?.unwrap_or_else(|| chunk.end());
            if next <= chunk.offset {
                return Err(UploadError::Protocol(format!(
                    "server confirmed offset {next} after chunk at {}",
                    chunk.offset
                )));
            }
            session.confirm(next)?;
            tracing::debug!(
                session_id = %session.id(),
                bytes_confirmed = next,
                progress = session.progress(),
                "progress"
            );
            offset = next;
        }

        tracing::info!(session_id = %session.id(), total_size = session.total_size(), "payload uploaded");
        Ok(())
    }

    /// Ask the server to verify the payload and close the session.
    pub async fn finalize(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(UploadError::NoSession)?;
        session.ensure_open()?;
        if !session.is_complete() {
            return Err(UploadError::Incomplete {
                confirmed: session.bytes_confirmed(),
                total: session.total_size(),
            });
        }

        self.memory.snapshot("finalize:before");
        let finalized = self.transport.finalize_session(session.id()).await;
        self.memory.snapshot("finalize:after");
        finalized?;

        session.mark_finalized()?;
        tracing::info!(
            session_id = %session.id(),
            hash_verified = session.integrity_hash().is_some(),
            "upload finalized"
        );
        Ok(())
    }

    /// Discard the current session. The server reaps it after inactivity.
    pub fn abandon(&mut self) -> Option<SessionId> {
        let session = self.session.as_mut()?;
        session.abandon();
        tracing::info!(session_id = %session.id(), state = %session.state(), "upload session abandoned");
        Some(session.id().clone())
    }
}
