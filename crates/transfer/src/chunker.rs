use std::path::Path;
use std::sync::Arc;

use crate::TransferError;
use crate::types::{ByteRange, Chunk, ChunkSource};

/// The ordered partition of a source into fixed-size chunks.
///
/// Chunk `i` starts at `i * chunk_size`; every chunk is full except the
/// last, which holds the remainder and is never empty. An empty source has
/// no chunks. Iterating twice yields the same partition.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    source: Arc<ChunkSource>,
    total_len: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Number of chunks.
    pub fn len(&self) -> u64 {
        self.total_len.div_ceil(self.chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Source length in bytes.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Returns chunk `index`, or `None` past the end.
    pub fn chunk(&self, index: u64) -> Option<Chunk> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.chunk_size;
        let len = self.chunk_size.min(self.total_len - start);
        Some(Chunk::new(
            index,
            ByteRange { start, len },
            Arc::clone(&self.source),
        ))
    }

    /// Iterates the chunks in sequence-index order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.len()).filter_map(|i| self.chunk(i))
    }
}

/// Splits a source of `total_len` bytes into `chunk_size` chunks.
pub fn split(
    source: ChunkSource,
    total_len: u64,
    chunk_size: u64,
) -> Result<ChunkPlan, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidConfiguration(
            "chunk size must be positive".into(),
        ));
    }
    Ok(ChunkPlan {
        source: Arc::new(source),
        total_len,
        chunk_size,
    })
}

/// Splits the file at `path`. Only its length is read here.
pub async fn split_file(path: &Path, chunk_size: u64) -> Result<ChunkPlan, TransferError> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(TransferError::InvalidPath(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    split(
        ChunkSource::File(path.to_path_buf()),
        metadata.len(),
        chunk_size,
    )
}

/// Splits bytes already in memory.
pub fn split_bytes(data: impl Into<Arc<[u8]>>, chunk_size: u64) -> Result<ChunkPlan, TransferError> {
    let data: Arc<[u8]> = data.into();
    let total_len = data.len() as u64;
    split(ChunkSource::Memory(data), total_len, chunk_size)
}
