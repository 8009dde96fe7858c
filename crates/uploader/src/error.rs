//! Upload error types.

use crate::transmitter::TransmitError;

/// Errors produced by an upload session or the merge request.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] chunkup_transfer::TransferError),

    #[error("chunk {index} failed: {source}")]
    Transmission {
        index: u64,
        #[source]
        source: TransmitError,
    },

    #[error("session already started")]
    AlreadyStarted,

    #[error("merge failed (code {code}): {message}")]
    Merge { code: i32, message: String },

    #[error("server replied {status}: {body}")]
    Rejected { status: u16, body: String },
}
