//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier assigned by the server.
///
/// The client never interprets the value. Callers may persist it to resume a
/// transfer after a device restart.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parse from a string, rejecting values that cannot travel in a header.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidSessionId("empty".to_string()));
        }
        if trimmed.chars().any(|c| c.is_control() || c == '"') {
            return Err(crate::Error::InvalidSessionId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session is open and accepting chunks.
    Open,
    /// Server verified the payload and closed the session.
    Finalized,
    /// Caller discarded the session.
    Abandoned,
}

impl SessionState {
    /// Check if the session can still receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Finalized => "finalized",
            Self::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Outcome of asking the server how far a session got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeStatus {
    /// Server has confirmed this many bytes.
    Resume(u64),
    /// Server does not know the session; the transfer restarts from zero
    /// under a new session.
    Unknown,
}

/// Client-side view of a server upload session.
///
/// `bytes_confirmed` only moves forward and never exceeds `total_size`.
#[derive(Clone, Debug)]
pub struct UploadSession {
    id: SessionId,
    total_size: u64,
    bytes_confirmed: u64,
    integrity_hash: Option<String>,
    state: SessionState,
}

impl UploadSession {
    /// Create a session freshly registered with the server.
    pub fn new(id: SessionId, total_size: u64, integrity_hash: Option<String>) -> Self {
        Self {
            id,
            total_size,
            bytes_confirmed: 0,
            integrity_hash,
            state: SessionState::Open,
        }
    }

    /// Rebuild a session from a persisted identifier.
    ///
    /// Nothing is assumed confirmed until the server says so.
    pub fn resumed(id: SessionId, total_size: u64) -> Self {
        Self::new(id, total_size, None)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn bytes_confirmed(&self) -> u64 {
        self.bytes_confirmed
    }

    pub fn integrity_hash(&self) -> Option<&str> {
        self.integrity_hash.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes still to be confirmed.
    pub fn remaining(&self) -> u64 {
        self.total_size - self.bytes_confirmed
    }

    /// Check if every byte has been confirmed.
    pub fn is_complete(&self) -> bool {
        self.total_size > 0 && self.bytes_confirmed == self.total_size
    }

    /// Completion percentage in `[0, 100]`; 0 for an empty session.
    pub fn progress(&self) -> f32 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.bytes_confirmed as f64 / self.total_size as f64 * 100.0) as f32
    }

    /// Adopt a server-confirmed offset.
    pub fn confirm(&mut self, offset: u64) -> crate::Result<()> {
        self.ensure_open()?;
        if offset > self.total_size {
            return Err(crate::Error::OffsetOutOfRange {
                reported: offset,
                total: self.total_size,
            });
        }
        if offset < self.bytes_confirmed {
            return Err(crate::Error::OffsetRegression {
                current: self.bytes_confirmed,
                reported: offset,
            });
        }
        self.bytes_confirmed = offset;
        Ok(())
    }

    /// Mark the session verified and closed by the server.
    pub fn mark_finalized(&mut self) -> crate::Result<()> {
        self.ensure_open()?;
        self.state = SessionState::Finalized;
        Ok(())
    }

    /// Discard the session. Idempotent for already-terminal sessions.
    pub fn abandon(&mut self) {
        if self.state.is_active() {
            self.state = SessionState::Abandoned;
        }
    }

    /// Fail unless the session is still open.
    pub fn ensure_open(&self) -> crate::Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(crate::Error::SessionClosed {
                id: self.id.to_string(),
                state: self.state.to_string(),
            })
        }
    }
}
