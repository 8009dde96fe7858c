//! HTTP server for chunked uploads.
//!
//! Chunks arrive one per request and are staged on disk by the
//! [`ChunkStore`]. A merge request hands the staged set to the
//! [`ReassemblyEngine`], which concatenates it in index order into the
//! target directory and removes the staging area.

mod merge;
mod routes;
mod server;
mod store;

pub use merge::{MergeSummary, ReassemblyEngine};
pub use routes::{AppState, router};
pub use server::{ServerConfig, UploadServer};
pub use store::{ChunkStore, StagedChunk, StoreResult};

use std::path::PathBuf;

/// Errors produced by the upload server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("no chunks staged for {0}")]
    NoChunksFound(String),

    #[error("cannot write to {}: {source}", path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server already running")]
    AlreadyRunning,
}

impl From<chunkup_transfer::TransferError> for ServerError {
    fn from(err: chunkup_transfer::TransferError) -> Self {
        match err {
            chunkup_transfer::TransferError::Io(e) => Self::Io(e),
            other => Self::InvalidName(other.to_string()),
        }
    }
}
