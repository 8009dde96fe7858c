use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

/// Half-open byte range `[start, start + len)` within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Where chunk payloads are read from.
#[derive(Debug)]
pub enum ChunkSource {
    /// A file on disk, read on demand.
    File(PathBuf),
    /// Bytes already in memory.
    Memory(Arc<[u8]>),
}

/// One contiguous byte range of a source, tagged with its sequence index.
///
/// Cloning is cheap: the source is shared and the payload is only read
/// when [`payload`](Self::payload) is awaited.
#[derive(Debug, Clone)]
pub struct Chunk {
    index: u64,
    range: ByteRange,
    source: Arc<ChunkSource>,
}

impl Chunk {
    pub(crate) fn new(index: u64, range: ByteRange, source: Arc<ChunkSource>) -> Self {
        Self {
            index,
            range,
            source,
        }
    }

    /// Position of this chunk in the source, dense from 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn len(&self) -> u64 {
        self.range.len
    }

    pub fn is_empty(&self) -> bool {
        self.range.len == 0
    }

    /// Reads the chunk's bytes from its source.
    ///
    /// Fails with [`TransferError::SourceChanged`] if the file shrank since
    /// it was split.
    pub async fn payload(&self) -> Result<Vec<u8>, TransferError> {
        match self.source.as_ref() {
            ChunkSource::Memory(bytes) => {
                let start = self.range.start as usize;
                let end = self.range.end() as usize;
                bytes
                    .get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or(TransferError::SourceChanged {
                        offset: self.range.start,
                        expected: self.range.len,
                        actual: (bytes.len() as u64).saturating_sub(self.range.start),
                    })
            }
            ChunkSource::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(self.range.start)).await?;

                let mut buf = Vec::with_capacity(self.range.len as usize);
                file.take(self.range.len).read_to_end(&mut buf).await?;

                if buf.len() as u64 != self.range.len {
                    return Err(TransferError::SourceChanged {
                        offset: self.range.start,
                        expected: self.range.len,
                        actual: buf.len() as u64,
                    });
                }
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_payload_is_the_range() {
        let source = Arc::new(ChunkSource::Memory(Arc::from(&b"0123456789"[..])));
        let chunk = Chunk::new(1, ByteRange { start: 4, len: 3 }, source);
        assert_eq!(chunk.payload().await.unwrap(), b"456");
        assert_eq!(chunk.range().end(), 7);
    }

    #[tokio::test]
    async fn file_payload_is_read_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"AABBCCDDEE").unwrap();

        let source = Arc::new(ChunkSource::File(path.clone()));
        let chunk = Chunk::new(2, ByteRange { start: 8, len: 2 }, source);

        // The file is read at payload time, not at construction time.
        std::fs::write(&path, b"AABBCCDDXY").unwrap();
        assert_eq!(chunk.payload().await.unwrap(), b"XY");
    }

    #[tokio::test]
    async fn truncated_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"AABBCCDDEE").unwrap();

        let source = Arc::new(ChunkSource::File(path.clone()));
        let chunk = Chunk::new(2, ByteRange { start: 8, len: 2 }, source);

        std::fs::write(&path, b"AABBCCDDE").unwrap();
        let err = chunk.payload().await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::SourceChanged {
                offset: 8,
                expected: 2,
                actual: 1
            }
        ));
    }
}
