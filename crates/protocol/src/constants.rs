/// Route accepting one multipart chunk per request.
pub const UPLOAD_PATH: &str = "/upload";

/// Route triggering reassembly of a fully staged file.
pub const MERGE_PATH: &str = "/merge";

/// Multipart field carrying the chunk bytes.
pub const FIELD_CHUNK: &str = "chunk";

/// Multipart field carrying the chunk's sequence index as a decimal string.
///
/// The name is historical: early clients sent a content hash here, the
/// protocol has always treated it as the index.
pub const FIELD_INDEX: &str = "hash";

/// Multipart field carrying the original file name, extension included.
pub const FIELD_NAME: &str = "name";

/// Reply body when a chunk was written to staging.
pub const REPLY_CHUNK_RECEIVED: &str = "chunk received";

/// Reply body when the chunk was already staged.
pub const REPLY_CHUNK_EXISTS: &str = "file chunk exist";

/// Reply body for any upload failure.
pub const REPLY_UPLOAD_FAILED: &str = "upload file chunk failed";

/// Message returned by a successful merge.
pub const MERGE_SUCCESS_MESSAGE: &str = "file merged success";

/// Merge response codes.
pub mod merge_code {
    pub const OK: i32 = 0;
    pub const NO_CHUNKS: i32 = 1;
    pub const IO: i32 = 2;
    pub const BUSY: i32 = 3;
    pub const INVALID_NAME: i32 = 4;
    /// The body is not a well-formed merge request.
    pub const BAD_REQUEST: i32 = 5;
}

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;
