//! Client-side state of one file upload.

use std::collections::BTreeMap;
use std::sync::Arc;

use chunkup_transfer::{Chunk, TransferError};

use crate::transmitter::TransmissionHandle;

/// A chunk that has not been acknowledged yet, plus the handle of its
/// current transmission when one is in flight.
#[derive(Debug)]
pub struct TransferEntry {
    chunk: Chunk,
    handle: Option<TransmissionHandle>,
}

impl TransferEntry {
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn is_in_flight(&self) -> bool {
        self.handle.is_some()
    }
}

/// The live set of a single upload.
///
/// Entries leave the set when their chunk is acknowledged. The session is
/// complete exactly when the set is empty; there is no separate flag.
#[derive(Debug)]
pub struct UploadSession {
    file_name: Arc<str>,
    chunk_size: u64,
    entries: BTreeMap<u64, TransferEntry>,
    started: bool,
    next_attempt: u64,
    acked_chunks: u64,
    acked_bytes: u64,
}

impl UploadSession {
    pub fn new(file_name: impl Into<Arc<str>>, chunk_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            chunk_size,
            entries: BTreeMap::new(),
            started: false,
            next_attempt: 0,
            acked_chunks: 0,
            acked_bytes: 0,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub(crate) fn shared_file_name(&self) -> Arc<str> {
        Arc::clone(&self.file_name)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn is_complete(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices still waiting for an acknowledgement, ascending.
    pub fn pending(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    /// Number of entries with a transmission in flight.
    pub fn in_flight(&self) -> usize {
        self.entries.values().filter(|e| e.is_in_flight()).count()
    }

    pub fn entry(&self, index: u64) -> Option<&TransferEntry> {
        self.entries.get(&index)
    }

    pub fn acked_chunks(&self) -> u64 {
        self.acked_chunks
    }

    pub fn acked_bytes(&self) -> u64 {
        self.acked_bytes
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    /// Fills the live set. Each index may appear once; on error the
    /// session is left untouched.
    pub(crate) fn load(
        &mut self,
        chunks: impl IntoIterator<Item = Chunk>,
    ) -> Result<(), TransferError> {
        let mut entries = BTreeMap::new();
        for chunk in chunks {
            let index = chunk.index();
            if entries.contains_key(&index) || self.entries.contains_key(&index) {
                return Err(TransferError::InvalidConfiguration(format!(
                    "chunk index {index} given twice"
                )));
            }
            entries.insert(
                index,
                TransferEntry {
                    chunk,
                    handle: None,
                },
            );
        }
        self.entries.append(&mut entries);
        self.started = true;
        Ok(())
    }

    /// Attaches a fresh handle to every idle entry and returns what the
    /// caller must transmit: the chunk, its attempt id and its token.
    pub(crate) fn attach_idle(&mut self) -> Vec<(Chunk, TransmissionHandle)> {
        let mut attached = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.handle.is_some() {
                continue;
            }
            let handle = TransmissionHandle::new(self.next_attempt);
            self.next_attempt += 1;

            entry.handle = Some(handle.clone());
            attached.push((entry.chunk.clone(), handle));
        }
        attached
    }

    /// Cancels every in-flight transmission and clears its handle.
    /// Returns how many were cancelled.
    pub(crate) fn detach_all(&mut self) -> usize {
        let mut cancelled = 0;
        for entry in self.entries.values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Records an acknowledgement. Returns the chunk if it was still live.
    ///
    /// Any attempt's ack counts: if a newer attempt is in flight for the
    /// same chunk it is cancelled, since the server already has the bytes.
    pub(crate) fn settle_ack(&mut self, index: u64) -> Option<Chunk> {
        let entry = self.entries.remove(&index)?;
        if let Some(handle) = entry.handle {
            handle.cancel();
        }
        self.acked_chunks += 1;
        self.acked_bytes += entry.chunk.len();
        Some(entry.chunk)
    }

    /// Records a failed attempt. Returns `true` if it was the entry's
    /// current attempt, in which case the entry becomes idle again.
    pub(crate) fn settle_failure(&mut self, index: u64, attempt: u64) -> bool {
        match self.entries.get_mut(&index) {
            Some(entry) if entry.handle.as_ref().is_some_and(|h| h.attempt() == attempt) => {
                entry.handle = None;
                true
            }
            _ => false,
        }
    }

    /// `true` if `index` is live and waiting for someone to resume it.
    pub(crate) fn is_idle(&self, index: u64) -> bool {
        self.entries.get(&index).is_some_and(|e| !e.is_in_flight())
    }
}
