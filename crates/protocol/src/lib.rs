//! Wire vocabulary for chunked uploads.
//!
//! Both sides of the transfer depend on this crate: the uploader builds
//! requests from it and the server parses them with it. Nothing here does
//! I/O.

pub mod constants;
pub mod messages;
pub mod staging;

// Re-export primary types for convenience.
pub use messages::{MergeRequest, MergeResponse, UploadReply};
pub use staging::{StagingKey, StagingKeyError};
