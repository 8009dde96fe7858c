//! Chunk model and file splitting.
//!
//! A source is split into a [`ChunkPlan`]: an ordered, restartable set of
//! [`Chunk`]s whose byte ranges tile the source exactly. Chunk payloads are
//! read lazily, so splitting a large file costs one `stat`.

mod chunker;
mod types;
mod validation;

pub use chunker::{ChunkPlan, split, split_bytes, split_file};
pub use types::{ByteRange, Chunk, ChunkSource};
pub use validation::validate_file_name;

pub use chunkup_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid file name: {0}")]
    InvalidPath(String),

    #[error("source changed: expected {expected} bytes at offset {offset}, read {actual}")]
    SourceChanged {
        offset: u64,
        expected: u64,
        actual: u64,
    },
}
