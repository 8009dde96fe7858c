//! Reassembly of staged chunks into the destination file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ServerError;
use crate::store::{ChunkStore, StagedChunk};

/// Outcome of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub file_name: String,
    pub chunks: usize,
    pub bytes: u64,
    pub destination: PathBuf,
}

/// Concatenates staged chunks into `<target_dir>/<name>`.
#[derive(Debug, Clone)]
pub struct ReassemblyEngine {
    store: ChunkStore,
    target_dir: PathBuf,
}

impl ReassemblyEngine {
    pub fn new(store: ChunkStore, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            target_dir: target_dir.into(),
        }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Merges every staged chunk of `name` in ascending index order.
    ///
    /// Chunks are appended one at a time, each flushed before it is
    /// deleted. The result is written to a hidden temporary file next to the
    /// destination and renamed over it at the end, so readers never see a
    /// partial file. The staging directory is removed on success.
    ///
    /// Gaps in the index sequence are not detected: whatever is staged is
    /// merged.
    pub async fn merge(&self, name: &str) -> Result<MergeSummary, ServerError> {
        let chunks = self.store.staged(name).await?;
        if chunks.is_empty() {
            return Err(ServerError::NoChunksFound(name.to_string()));
        }

        tokio::fs::create_dir_all(&self.target_dir)
            .await
            .map_err(|source| ServerError::DestinationUnavailable {
                path: self.target_dir.clone(),
                source,
            })?;

        let destination = self.target_dir.join(name);
        // Fixed-length name: `name` may already be close to NAME_MAX.
        let partial = self
            .target_dir
            .join(format!(".{}.partial", Uuid::new_v4()));

        let bytes = match concatenate(&chunks, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_quietly(&partial).await;
                return Err(e);
            }
        };

        if let Err(source) = tokio::fs::rename(&partial, &destination).await {
            remove_quietly(&partial).await;
            return Err(ServerError::DestinationUnavailable {
                path: destination,
                source,
            });
        }

        self.store.discard(name).await?;

        info!(
            file = name,
            chunks = chunks.len(),
            bytes,
            destination = %destination.display(),
            "file merged"
        );
        Ok(MergeSummary {
            file_name: name.to_string(),
            chunks: chunks.len(),
            bytes,
            destination,
        })
    }
}

/// Appends each chunk to `out`, deleting it once its bytes are flushed.
async fn concatenate(chunks: &[StagedChunk], out: &Path) -> Result<u64, ServerError> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(out)
        .await
        .map_err(|source| ServerError::DestinationUnavailable {
            path: out.to_path_buf(),
            source,
        })?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;

    for chunk in chunks {
        let mut reader = tokio::fs::File::open(&chunk.path).await?;
        let copied = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        drop(reader);

        tokio::fs::remove_file(&chunk.path).await?;
        debug!(index = chunk.index(), bytes = copied, "chunk appended");
        total += copied;
    }

    writer.get_ref().sync_all().await?;
    Ok(total)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), "failed to remove partial file: {e}");
        }
    }
}
