use serde::{Deserialize, Serialize};

use crate::constants::{MERGE_SUCCESS_MESSAGE, REPLY_CHUNK_EXISTS, REPLY_CHUNK_RECEIVED, merge_code};

/// Body of a merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub filename: String,
    /// Chunk size used by the sender. Accepted for compatibility with older
    /// clients; ordering never depends on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl MergeRequest {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size: None,
        }
    }
}

/// Body of a merge response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResponse {
    pub code: i32,
    pub message: String,
}

impl MergeResponse {
    /// The response sent after a successful merge.
    pub fn success() -> Self {
        Self {
            code: merge_code::OK,
            message: MERGE_SUCCESS_MESSAGE.to_string(),
        }
    }

    /// A failed merge with a non-zero code.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == merge_code::OK
    }
}

/// Plain-text reply to a successful upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReply {
    /// The chunk was written to staging.
    Received,
    /// A chunk with the same name and index was already staged; nothing
    /// was written.
    AlreadyExists,
}

impl UploadReply {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => REPLY_CHUNK_RECEIVED,
            Self::AlreadyExists => REPLY_CHUNK_EXISTS,
        }
    }

    /// Parses a reply body. Surrounding whitespace is ignored.
    pub fn parse(body: &str) -> Option<Self> {
        match body.trim() {
            REPLY_CHUNK_RECEIVED => Some(Self::Received),
            REPLY_CHUNK_EXISTS => Some(Self::AlreadyExists),
            _ => None,
        }
    }
}
