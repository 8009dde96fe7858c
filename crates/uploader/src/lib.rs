//! Client side of chunked, resumable uploads.
//!
//! This crate owns the sending half of the protocol: it splits a file
//! into chunks, transmits them concurrently and asks the server to merge
//! them once every chunk has been acknowledged. Transport is behind the
//! [`ChunkTransmitter`] trait so the orchestration logic can be driven
//! without a server.
//!
//! # Pipeline
//!
//! 1. **Split** the file into fixed-size chunks
//! 2. **Transmit** every chunk; pause and resume at any time
//! 3. **Merge** once the live set is empty

pub mod client;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod transmitter;
pub mod types;

// Re-export primary types for convenience.
pub use client::{Uploader, upload_name};
pub use error::UploadError;
pub use orchestrator::TransferOrchestrator;
pub use session::{TransferEntry, UploadSession};
pub use transmitter::{
    Ack, ChunkTransmitter, HttpTransmitter, TransmissionHandle, TransmitError, TransmitFuture,
    transmit,
};
pub use types::{SessionComplete, TransferEvent, UploaderConfig};
