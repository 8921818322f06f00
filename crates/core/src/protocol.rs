//! Wire paths, headers and request bodies.
//!
//! Requests are small JSON objects (or raw bytes for chunks); responses are
//! flat scalar objects read with [`crate::response`].

use serde::{Deserialize, Serialize};

/// `POST` a [`StartRequest`]; responds with `sessionId` and `success`.
pub const START_PATH: &str = "upload/init";
/// `POST` raw chunk bytes; responds with `success` and optionally `resumeOffset`.
pub const CHUNK_PATH: &str = "upload/chunk";
/// `GET` with a `sessionId` query; responds with `resumeOffset` and `success`.
pub const STATUS_PATH: &str = "upload/status";
/// `POST` a [`FinalizeRequest`]; responds with `success` and `verified`.
pub const FINALIZE_PATH: &str = "upload/finalize";

/// Query parameter carrying the session id on status requests.
pub const SESSION_QUERY: &str = "sessionId";

/// Chunk request header naming the session the bytes belong to.
pub const SESSION_HEADER: &str = "x-session-id";
/// Chunk request header with the payload offset of the first byte.
pub const OFFSET_HEADER: &str = "x-chunk-offset";
/// Chunk request header with the number of bytes in the body.
pub const LENGTH_HEADER: &str = "x-chunk-length";

/// Request to register a new upload session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub device_id: String,
    pub total_size: u64,
    /// Integrity digest supplied by the caller, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Request to verify and close a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: String,
}
