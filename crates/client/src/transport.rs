//! HTTP exchanges with the upload server.

use crate::error::{Result, UploadError};
use bytes::Bytes;
use chunklift_core::protocol::{
    self, CHUNK_PATH, FINALIZE_PATH, FinalizeRequest, START_PATH, STATUS_PATH, StartRequest,
};
use chunklift_core::{Chunk, ResumeStatus, ServerResponse, SessionId, UploaderConfig};
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Sends protocol requests, one connection per exchange.
///
/// Control exchanges (start, status, finalize) are attempted once. Chunks are
/// retried up to `max_attempts` times with a fixed delay between attempts.
#[derive(Clone, Debug)]
pub struct ChunkTransport {
    http: reqwest::Client,
    base_url: Url,
    max_attempts: u32,
    retry_delay: Duration,
}

/// A well-formed response that reported `success:false`.
fn refused(operation: &'static str) -> UploadError {
    UploadError::Rejected {
        operation,
        status: StatusCode::OK.as_u16(),
        body: "success=false".to_string(),
    }
}

async fn fetch(req: reqwest::RequestBuilder) -> Result<(StatusCode, String)> {
    let response = req.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

impl ChunkTransport {
    pub fn new(config: &UploaderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url()).map_err(|e| {
            chunklift_core::Error::InvalidConfig(format!("invalid server address: {e}"))
        })?;

        // Every exchange opens a fresh connection.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(0);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| {
            chunklift_core::Error::InvalidConfig(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            http,
            base_url,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| UploadError::Protocol(format!("failed to build URL for {path}: {e}")))
    }

    /// Send one request and read the flat response body.
    ///
    /// Non-2xx statuses are rejections; a body without `success` is a
    /// protocol failure.
    async fn exchange(
        &self,
        operation: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<ServerResponse> {
        let (status, body) = fetch(req).await?;
        if !status.is_success() {
            return Err(UploadError::Rejected {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(ServerResponse::parse(&body)?)
    }

    /// Register a session and return the identifier the server assigned.
    pub async fn start_session(
        &self,
        device_id: &str,
        total_size: u64,
        integrity_hash: Option<&str>,
    ) -> Result<SessionId> {
        let request = StartRequest {
            device_id: device_id.to_string(),
            total_size,
            hash: integrity_hash.map(str::to_string),
        };
        let url = self.url(START_PATH)?;
        let response = self
            .exchange("start", self.http.post(url).json(&request))
            .await?;
        if !response.success {
            return Err(refused("start"));
        }
        let raw = response
            .session_id
            .ok_or_else(|| UploadError::Protocol("start response has no sessionId".to_string()))?;
        SessionId::parse(&raw).map_err(|e| UploadError::Protocol(e.to_string()))
    }

    /// Ask the server how many bytes it has confirmed for `session_id`.
    ///
    /// A 404 or `success:false` means the server no longer knows the session.
    pub async fn query_status(&self, session_id: &SessionId) -> Result<ResumeStatus> {
        let mut url = self.url(STATUS_PATH)?;
        url.query_pairs_mut()
            .append_pair(protocol::SESSION_QUERY, session_id.as_str());

        let response = match self.exchange("status", self.http.get(url)).await {
            Err(UploadError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(ResumeStatus::Unknown);
            }
            other => other?,
        };
        if !response.success {
            return Ok(ResumeStatus::Unknown);
        }
        let offset = response.resume_offset.ok_or_else(|| {
            UploadError::Protocol("status response has no usable resumeOffset".to_string())
        })?;
        Ok(ResumeStatus::Resume(offset))
    }

    /// Ask the server to verify the payload and close the session.
    pub async fn finalize_session(&self, session_id: &SessionId) -> Result<()> {
        let request = FinalizeRequest {
            session_id: session_id.as_str().to_string(),
        };
        let url = self.url(FINALIZE_PATH)?;
        let response = self
            .exchange("finalize", self.http.post(url).json(&request))
            .await?;
        if !response.success {
            return Err(refused("finalize"));
        }
        match response.verified {
            Some(true) => Ok(()),
            Some(false) => Err(UploadError::Integrity {
                session_id: session_id.to_string(),
            }),
            None => Err(UploadError::Protocol(
                "finalize response has no verified flag".to_string(),
            )),
        }
    }

    /// One attempt at sending a chunk. Returns the server's resume offset if
    /// it reported one.
    ///
    /// A refusal that reports a resume offset past `offset` means an earlier
    /// attempt landed even though its response was lost; that offset is
    /// returned as a success.
    async fn send_chunk(&self, session_id: &SessionId, offset: u64, body: Bytes) -> Result<Option<u64>> {
        let url = self.url(CHUNK_PATH)?;
        let req = self
            .http
            .post(url)
            .header(protocol::SESSION_HEADER, session_id.as_str())
            .header(protocol::OFFSET_HEADER, offset.to_string())
            .header(protocol::LENGTH_HEADER, body.len().to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let (status, body) = fetch(req).await?;
        let parsed = ServerResponse::parse(&body);

        match parsed {
            Ok(response) if status.is_success() && response.success => Ok(response.resume_offset),
            Ok(ServerResponse {
                resume_offset: Some(held),
                ..
            }) if held > offset => {
                tracing::info!(
                    session_id = %session_id,
                    offset,
                    resume_offset = held,
                    status = status.as_u16(),
                    "server already holds chunk"
                );
                Ok(Some(held))
            }
            _ if !status.is_success() => Err(UploadError::Rejected {
                operation: "chunk",
                status: status.as_u16(),
                body,
            }),
            Ok(_) => Err(refused("chunk")),
            Err(e) => Err(e.into()),
        }
    }

    /// Send `chunk`, retrying any failure up to the attempt limit.
    ///
    /// Exhausting the attempts is permanent for this chunk and the caller
    /// aborts the transfer.
    pub async fn send_with_retry(&self, session_id: &SessionId, chunk: Chunk<'_>) -> Result<Option<u64>> {
        let body = Bytes::copy_from_slice(chunk.data);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_chunk(session_id, chunk.offset, body.clone()).await {
                Ok(resume_offset) => {
                    tracing::debug!(
                        session_id = %session_id,
                        offset = chunk.offset,
                        len = chunk.len(),
                        attempt,
                        "chunk confirmed"
                    );
                    return Ok(resume_offset);
                }
                Err(err) if attempt < self.max_attempts => {
                    tracing::warn!(
                        session_id = %session_id,
                        offset = chunk.offset,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "chunk attempt failed, retrying in {}ms",
                        self.retry_delay.as_millis()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    tracing::error!(
                        session_id = %session_id,
                        offset = chunk.offset,
                        attempts = attempt,
                        error = %err,
                        "chunk failed permanently"
                    );
                    return Err(UploadError::ChunkExhausted {
                        offset: chunk.offset,
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
            }
        }
    }
}
