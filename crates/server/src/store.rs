//! On-disk staging of received chunks.
//!
//! Each source file gets its own directory under the staging root, named
//! after the file. A chunk is published under its [`StagingKey`] name and
//! never overwritten: the first writer wins, later writers of the same
//! index are told it already exists.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chunkup_protocol::{StagingKey, UploadReply};
use chunkup_transfer::validate_file_name;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ServerError;

/// Result of staging one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResult {
    Stored,
    AlreadyExists,
}

impl StoreResult {
    pub fn reply(self) -> UploadReply {
        match self {
            Self::Stored => UploadReply::Received,
            Self::AlreadyExists => UploadReply::AlreadyExists,
        }
    }
}

/// A chunk found in a staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChunk {
    pub key: StagingKey,
    pub path: PathBuf,
}

impl StagedChunk {
    pub fn index(&self) -> u64 {
        self.key.index()
    }
}

/// Staging area for chunks awaiting reassembly.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the chunks of `name`.
    pub fn staging_dir(&self, name: &str) -> Result<PathBuf, ServerError> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// Stages chunk `index` of `name`.
    ///
    /// The payload is written to a private temporary file and then linked
    /// into place, so a staged chunk is always complete and a concurrent
    /// upload of the same index cannot clobber it.
    pub async fn accept(
        &self,
        name: &str,
        index: u64,
        payload: &[u8],
    ) -> Result<StoreResult, ServerError> {
        let dir = self.staging_dir(name)?;
        let dest = dir.join(StagingKey::new(name, index).file_name());

        if tokio::fs::try_exists(&dest).await? {
            debug!(file = name, index, "chunk already staged");
            return Ok(StoreResult::AlreadyExists);
        }

        tokio::fs::create_dir_all(&dir).await?;
        let tmp = dir.join(format!(".{}.part", Uuid::new_v4()));
        let result = publish(&tmp, &dest, payload).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %tmp.display(), "failed to remove temporary chunk: {e}");
            }
        }

        match result {
            Ok(StoreResult::Stored) => {
                debug!(file = name, index, bytes = payload.len(), "chunk staged");
                Ok(StoreResult::Stored)
            }
            other => other,
        }
    }

    /// Lists the staged chunks of `name`, ascending by index.
    ///
    /// A missing staging directory yields an empty list. Files that are
    /// not chunks of `name` are skipped.
    pub async fn staged(&self, name: &str) -> Result<Vec<StagedChunk>, ServerError> {
        let dir = self.staging_dir(name)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(dir = %dir.display(), "skipping non-UTF-8 entry");
                continue;
            };

            match StagingKey::parse(name, &file_name) {
                // Only the canonical spelling counts, so `x-01` never
                // shadows `x-1`.
                Ok(key) if key.file_name() == file_name => chunks.push(StagedChunk {
                    key,
                    path: entry.path(),
                }),
                _ if is_temporary(&file_name) => {}
                _ => warn!(dir = %dir.display(), entry = %file_name, "skipping foreign file"),
            }
        }

        chunks.sort_by_key(StagedChunk::index);
        Ok(chunks)
    }

    /// Removes the staging directory of `name` and everything in it.
    pub async fn discard(&self, name: &str) -> Result<(), ServerError> {
        let dir = self.staging_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn publish(tmp: &Path, dest: &Path, payload: &[u8]) -> Result<StoreResult, ServerError> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .await?;
    file.write_all(payload).await?;
    file.sync_all().await?;
    drop(file);

    match tokio::fs::hard_link(tmp, dest).await {
        Ok(()) => Ok(StoreResult::Stored),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(StoreResult::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

fn is_temporary(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(".part")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().join("temp"));
        (dir, store)
    }

    #[tokio::test]
    async fn accept_writes_named_chunk() {
        let (_dir, store) = store();
        let result = store.accept("movie.mp4", 3, b"abc").await.unwrap();
        assert_eq!(result, StoreResult::Stored);

        let path = store.root().join("movie.mp4").join("movie-3.mp4");
        assert_eq!(std::fs::read(path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn duplicate_chunk_is_not_overwritten() {
        let (_dir, store) = store();
        store.accept("movie.mp4", 0, b"first").await.unwrap();
        let result = store.accept("movie.mp4", 0, b"second").await.unwrap();
        assert_eq!(result, StoreResult::AlreadyExists);
        assert_eq!(result.reply(), UploadReply::AlreadyExists);

        let staged = store.staged("movie.mp4").await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(std::fs::read(&staged[0].path).unwrap(), b"first");
    }

    #[tokio::test]
    async fn concurrent_duplicates_stage_once() {
        let (_dir, store) = store();
        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.accept("a.bin", 0, &[i; 16]).await.unwrap()
            }));
        }
        let mut stored = 0;
        for task in tasks {
            if task.await.unwrap() == StoreResult::Stored {
                stored += 1;
            }
        }
        assert_eq!(stored, 1);

        let staged = store.staged("a.bin").await.unwrap();
        assert_eq!(staged.len(), 1);
        let content = std::fs::read(&staged[0].path).unwrap();
        assert_eq!(content.len(), 16);
        assert!(content.iter().all(|&b| b == content[0]));
    }

    #[tokio::test]
    async fn staged_sorts_numerically() {
        let (_dir, store) = store();
        for index in [10, 2, 0, 1] {
            store.accept("data.txt", index, b"x").await.unwrap();
        }
        let indices: Vec<_> = store
            .staged("data.txt")
            .await
            .unwrap()
            .iter()
            .map(StagedChunk::index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 10]);
    }

    #[tokio::test]
    async fn staged_skips_foreign_files() {
        let (_dir, store) = store();
        store.accept("data.txt", 0, b"x").await.unwrap();
        let dir = store.staging_dir("data.txt").unwrap();
        std::fs::write(dir.join("notes.md"), b"?").unwrap();
        std::fs::write(dir.join("data-01.txt"), b"?").unwrap();
        std::fs::write(dir.join(".0b1c.part"), b"?").unwrap();

        let staged = store.staged("data.txt").await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].index(), 0);
    }

    #[tokio::test]
    async fn staged_missing_dir_is_empty() {
        let (_dir, store) = store();
        assert!(store.staged("nothing.bin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dotfiles_and_extensionless_names() {
        let (_dir, store) = store();
        store.accept(".bashrc", 1, b"x").await.unwrap();
        store.accept("README", 0, b"y").await.unwrap();

        assert_eq!(store.staged(".bashrc").await.unwrap()[0].index(), 1);
        assert!(store.root().join("README").join("README-0").exists());
    }

    #[tokio::test]
    async fn unsafe_names_are_rejected() {
        let (_dir, store) = store();
        for name in ["", "..", "../x", "a/b", "/etc/passwd"] {
            let err = store.accept(name, 0, b"x").await.unwrap_err();
            assert!(matches!(err, ServerError::InvalidName(_)), "{name:?}");
        }
    }

    #[tokio::test]
    async fn discard_removes_staging_dir() {
        let (_dir, store) = store();
        store.accept("a.bin", 0, b"x").await.unwrap();
        store.discard("a.bin").await.unwrap();
        assert!(!store.staging_dir("a.bin").unwrap().exists());
        // Idempotent.
        store.discard("a.bin").await.unwrap();
    }
}
