//! Transfer orchestrator with pause/resume.
//!
//! Every pending chunk is transmitted on its own task. The live set lives
//! in an [`UploadSession`] behind a synchronous mutex that is never held
//! across an await; tasks settle their result against it and wake
//! [`TransferOrchestrator::completion`] through an internal channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chunkup_transfer::Chunk;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::session::UploadSession;
use crate::transmitter::{Ack, ChunkTransmitter, TransmissionHandle, TransmitError, transmit};
use crate::types::{SessionComplete, TransferEvent};

const EVENT_CAPACITY: usize = 1024;

/// What a finished transmission task reports back.
enum Outcome {
    Acked,
    Failed { index: u64, error: TransmitError },
}

/// State shared with transmission tasks.
struct Shared {
    session: Mutex<UploadSession>,
    transmitter: Arc<dyn ChunkTransmitter>,
    limiter: Option<Semaphore>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    events: mpsc::Sender<TransferEvent>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, UploadSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransferEvent) {
        // Progress is best-effort; a full or dropped receiver never stalls
        // the transfer.
        let _ = self.events.try_send(event);
    }
}

/// Drives one upload session.
///
/// `start` dispatches every chunk concurrently and resolves once all of
/// them are acknowledged. `pause` aborts whatever is in flight without
/// losing progress; `resume` re-sends exactly the chunks that are still
/// pending. While paused, `start`/`completion` stay pending.
pub struct TransferOrchestrator {
    shared: Arc<Shared>,
    outcomes: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outcome>>,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
    completed: AtomicBool,
    paused: AtomicBool,
}

impl TransferOrchestrator {
    /// Creates an orchestrator for `file_name`. Nothing is sent until
    /// [`start`](Self::start).
    pub fn new(
        file_name: impl Into<Arc<str>>,
        chunk_size: u64,
        transmitter: Arc<dyn ChunkTransmitter>,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(UploadSession::new(file_name, chunk_size)),
                transmitter,
                limiter: None,
                outcomes: outcomes_tx,
                events: events_tx,
            }),
            outcomes: tokio::sync::Mutex::new(outcomes_rx),
            events_rx: Some(events_rx),
            completed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    /// Caps the number of simultaneous requests. A limit of 0 is treated
    /// as 1.
    ///
    /// Must be called before the orchestrator is shared.
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.limiter = Some(Semaphore::new(limit.max(1)));
        }
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    pub fn file_name(&self) -> String {
        self.shared.session().file_name().to_string()
    }

    /// Indices not yet acknowledged, ascending.
    pub fn pending(&self) -> Vec<u64> {
        self.shared.session().pending()
    }

    /// Number of chunks currently being transmitted.
    pub fn in_flight(&self) -> usize {
        self.shared.session().in_flight()
    }

    /// `true` between a [`pause`](Self::pause) and the next
    /// [`resume`](Self::resume).
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// `true` once every chunk is acknowledged.
    pub fn is_complete(&self) -> bool {
        self.shared.session().is_complete()
    }

    /// Registers `chunks` as the live set, transmits all of them and waits
    /// for completion.
    ///
    /// Returns the first transmission failure that is not superseded by a
    /// later attempt. The session survives the error: call
    /// [`resume`](Self::resume) and then [`completion`](Self::completion)
    /// to carry on. An empty set completes immediately.
    pub async fn start(
        &self,
        chunks: impl IntoIterator<Item = Chunk>,
    ) -> Result<SessionComplete, UploadError> {
        let attached = {
            let mut session = self.shared.session();
            if session.is_started() {
                return Err(UploadError::AlreadyStarted);
            }
            session.load(chunks)?;
            info!(
                file = session.file_name(),
                chunks = session.pending().len(),
                "transfer started"
            );
            session.attach_idle()
        };
        self.dispatch(attached);
        self.completion().await
    }

    /// Waits until the live set is empty, or until a chunk fails and
    /// nothing has re-issued it since.
    pub async fn completion(&self) -> Result<SessionComplete, UploadError> {
        let mut outcomes = self.outcomes.lock().await;
        loop {
            if let Some(done) = self.check_complete() {
                return Ok(done);
            }

            // The sender lives in `shared`, which we hold.
            let Some(outcome) = outcomes.recv().await else {
                continue;
            };

            if let Outcome::Failed { index, error } = outcome {
                let idle = self.shared.session().is_idle(index);
                if idle {
                    return Err(UploadError::Transmission {
                        index,
                        source: error,
                    });
                }
            }
        }
    }

    /// Aborts every in-flight transmission. Acknowledged chunks stay
    /// acknowledged; the rest stay pending. Idempotent.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        let (cancelled, file_name) = {
            let mut session = self.shared.session();
            (session.detach_all(), session.file_name().to_string())
        };
        if cancelled > 0 {
            info!(file = %file_name, cancelled, "transfer paused");
            self.shared.emit(TransferEvent::Paused { cancelled });
        }
    }

    /// Re-sends every pending chunk that is not already in flight and
    /// returns how many were re-issued. Does nothing once complete.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn resume(&self) -> usize {
        self.paused.store(false, Ordering::SeqCst);
        let (attached, file_name) = {
            let mut session = self.shared.session();
            (session.attach_idle(), session.file_name().to_string())
        };
        let reissued = attached.len();
        if reissued > 0 {
            info!(file = %file_name, reissued, "transfer resumed");
            self.shared.emit(TransferEvent::Resumed { reissued });
            self.dispatch(attached);
        }
        reissued
    }

    fn check_complete(&self) -> Option<SessionComplete> {
        let done = {
            let session = self.shared.session();
            if !session.is_complete() {
                return None;
            }
            SessionComplete {
                file_name: session.file_name().to_string(),
                chunks: session.acked_chunks(),
                bytes: session.acked_bytes(),
            }
        };
        if !self.completed.swap(true, Ordering::SeqCst) {
            info!(file = %done.file_name, chunks = done.chunks, bytes = done.bytes, "transfer complete");
            self.shared.emit(TransferEvent::Completed {
                chunks: done.chunks,
                bytes: done.bytes,
            });
        }
        Some(done)
    }

    fn dispatch(&self, attached: Vec<(Chunk, TransmissionHandle)>) {
        if attached.is_empty() {
            return;
        }
        let file_name = self.shared.session().shared_file_name();
        for (chunk, handle) in attached {
            tokio::spawn(drive(
                Arc::clone(&self.shared),
                chunk,
                handle,
                Arc::clone(&file_name),
            ));
        }
    }
}

impl Drop for TransferOrchestrator {
    fn drop(&mut self) {
        self.shared.session().detach_all();
    }
}

/// Transmits one chunk and settles the result against the session.
async fn drive(shared: Arc<Shared>, chunk: Chunk, handle: TransmissionHandle, file_name: Arc<str>) {
    let index = chunk.index();
    let token = handle.token();

    let result = match &shared.limiter {
        Some(limiter) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(TransmitError::Cancelled),
                permit = limiter.acquire() => match permit {
                    Ok(_permit) => {
                        transmit(shared.transmitter.as_ref(), chunk, file_name, token.clone()).await
                    }
                    Err(_) => Err(TransmitError::Cancelled),
                },
            }
        }
        None => transmit(shared.transmitter.as_ref(), chunk, file_name, token.clone()).await,
    };

    match result {
        Ok(ack) => {
            let acked = shared.session().settle_ack(index);
            if let Some(chunk) = acked {
                debug!(index, bytes = chunk.len(), ?ack, "chunk acknowledged");
                shared.emit(TransferEvent::ChunkAcked {
                    index,
                    bytes: chunk.len(),
                    duplicate: ack == Ack::AlreadyStaged,
                });
                let _ = shared.outcomes.send(Outcome::Acked);
            }
        }
        Err(TransmitError::Cancelled) => {
            debug!(index, attempt = handle.attempt(), "transmission cancelled");
            shared.emit(TransferEvent::ChunkCancelled { index });
        }
        Err(error) => {
            let current = shared.session().settle_failure(index, handle.attempt());
            if current {
                warn!(index, error = %error, "chunk failed");
                shared.emit(TransferEvent::ChunkFailed {
                    index,
                    error: error.to_string(),
                });
                let _ = shared.outcomes.send(Outcome::Failed { index, error });
            }
        }
    }
}
