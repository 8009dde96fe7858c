//! Sending a single chunk.
//!
//! A [`ChunkTransmitter`] performs one request per chunk and never retries.
//! Cancellation is layered on top by [`transmit`]: once the
//! [`TransmissionHandle`] is cancelled the request future is dropped, so no
//! further bytes leave the process for that attempt.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chunkup_protocol::UploadReply;
use chunkup_protocol::constants::{FIELD_CHUNK, FIELD_INDEX, FIELD_NAME};
use chunkup_transfer::{Chunk, TransferError};
use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Acknowledgement for a chunk accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The server staged the chunk.
    Stored,
    /// The server already had the chunk; nothing was written.
    AlreadyStaged,
}

impl From<UploadReply> for Ack {
    fn from(reply: UploadReply) -> Self {
        match reply {
            UploadReply::Received => Self::Stored,
            UploadReply::AlreadyExists => Self::AlreadyStaged,
        }
    }
}

/// Why a single transmission did not produce an [`Ack`].
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    /// Aborted through its handle. Not a failure of the transfer.
    #[error("cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server replied {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("could not read chunk: {0}")]
    Source(#[from] TransferError),
}

impl TransmitError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A boxed future resolving to the outcome of one transmission.
pub type TransmitFuture = Pin<Box<dyn Future<Output = Result<Ack, TransmitError>> + Send>>;

/// Sends one chunk to the server.
///
/// Implementations report every failure as-is; retry decisions are made
/// above the orchestrator. The returned future must own everything it
/// needs so it can run on a spawned task.
pub trait ChunkTransmitter: Send + Sync + 'static {
    fn send(&self, chunk: Chunk, file_name: Arc<str>) -> TransmitFuture;
}

/// Cancellation capability for one in-flight transmission.
///
/// Clones share the same token.
#[derive(Debug, Clone)]
pub struct TransmissionHandle {
    attempt: u64,
    token: CancellationToken,
}

impl TransmissionHandle {
    pub(crate) fn new(attempt: u64) -> Self {
        Self {
            attempt,
            token: CancellationToken::new(),
        }
    }

    /// Identifies this attempt within its session.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Aborts the transmission. Synchronous and idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Runs `transmitter.send` until it finishes or `cancel` fires.
///
/// Cancellation wins ties, so a cancelled attempt always resolves to
/// [`TransmitError::Cancelled`] and its request future is dropped.
pub async fn transmit(
    transmitter: &dyn ChunkTransmitter,
    chunk: Chunk,
    file_name: Arc<str>,
    cancel: CancellationToken,
) -> Result<Ack, TransmitError> {
    if cancel.is_cancelled() {
        return Err(TransmitError::Cancelled);
    }
    let request = transmitter.send(chunk, file_name);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransmitError::Cancelled),
        result = request => result,
    }
}

/// Sends chunks as multipart POSTs to the upload endpoint.
#[derive(Clone)]
pub struct HttpTransmitter {
    http: reqwest::Client,
    upload_url: String,
}

impl HttpTransmitter {
    pub fn new(http: reqwest::Client, upload_url: impl Into<String>) -> Self {
        Self {
            http,
            upload_url: upload_url.into(),
        }
    }
}

impl ChunkTransmitter for HttpTransmitter {
    fn send(&self, chunk: Chunk, file_name: Arc<str>) -> TransmitFuture {
        let http = self.http.clone();
        let url = self.upload_url.clone();

        Box::pin(async move {
            let index = chunk.index();
            let payload = chunk.payload().await?;
            let bytes = payload.len();

            let part = Part::bytes(payload)
                .file_name(file_name.to_string())
                .mime_str("application/octet-stream")?;
            let form = Form::new()
                .part(FIELD_CHUNK, part)
                .text(FIELD_INDEX, index.to_string())
                .text(FIELD_NAME, file_name.to_string());

            let resp = http.post(&url).multipart(form).send().await?;
            let status = resp.status();
            let body = resp.text().await?;

            if !status.is_success() {
                return Err(TransmitError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let reply = UploadReply::parse(&body).ok_or_else(|| TransmitError::Rejected {
                status: status.as_u16(),
                body: body.clone(),
            })?;

            debug!(file = %file_name, index, bytes, reply = reply.as_str(), "chunk sent");
            Ok(reply.into())
        })
    }
}
