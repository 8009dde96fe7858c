//! Data types for the upload flow.

use std::time::Duration;

use chunkup_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Settings for an [`Uploader`](crate::Uploader).
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Base URL of the server, e.g. `http://localhost:3000`.
    pub server_url: String,
    /// Bytes per chunk. Must be positive.
    pub chunk_size: u64,
    /// Upper bound on simultaneous chunk requests (`None` = unbounded).
    pub max_in_flight: Option<usize>,
    /// How many times a failed session is resumed before giving up.
    pub retries: u32,
    /// Delay before each resume.
    pub retry_backoff: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_in_flight: None,
            retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Progress event emitted by a [`TransferOrchestrator`](crate::TransferOrchestrator).
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// A chunk was acknowledged and left the live set.
    ChunkAcked {
        index: u64,
        bytes: u64,
        /// The server already had this chunk.
        duplicate: bool,
    },
    /// An in-flight transmission was aborted by `pause()`.
    ChunkCancelled { index: u64 },
    /// A transmission failed; the chunk stays pending.
    ChunkFailed { index: u64, error: String },
    /// `pause()` aborted this many in-flight transmissions.
    Paused { cancelled: usize },
    /// `resume()` re-issued this many pending chunks.
    Resumed { reissued: usize },
    /// The live set became empty.
    Completed { chunks: u64, bytes: u64 },
}

/// Returned when every chunk of a session has been acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionComplete {
    pub file_name: String,
    pub chunks: u64,
    pub bytes: u64,
}
