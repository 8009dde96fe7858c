//! HTTP endpoints.
//!
//! - POST `/upload` - multipart chunk upload (`chunk`, `hash`, `name`)
//! - POST `/merge`  - JSON `{ "filename" }`, reassembles the staged chunks

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chunkup_protocol::constants::{
    FIELD_CHUNK, FIELD_INDEX, FIELD_NAME, MERGE_PATH, REPLY_UPLOAD_FAILED, UPLOAD_PATH,
    merge_code,
};
use chunkup_protocol::{MergeRequest, MergeResponse};
use tracing::{error, warn};

use crate::ServerError;
use crate::merge::ReassemblyEngine;
use crate::store::{ChunkStore, StoreResult};

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    engine: ReassemblyEngine,
    merging: Arc<Mutex<HashSet<String>>>,
    max_chunk_bytes: usize,
}

impl AppState {
    pub fn new(engine: ReassemblyEngine, max_chunk_bytes: usize) -> Self {
        Self {
            engine,
            merging: Arc::new(Mutex::new(HashSet::new())),
            max_chunk_bytes,
        }
    }

    pub fn store(&self) -> &ChunkStore {
        self.engine.store()
    }

    pub fn engine(&self) -> &ReassemblyEngine {
        &self.engine
    }

    /// Marks `name` as merging. Returns `None` if a merge of `name` is
    /// already running.
    fn claim_merge(&self, name: &str) -> Option<MergeClaim> {
        let mut merging = self.merging.lock().unwrap_or_else(PoisonError::into_inner);
        merging.insert(name.to_string()).then(|| MergeClaim {
            merging: Arc::clone(&self.merging),
            name: name.to_string(),
        })
    }
}

/// Releases a merge claim when dropped.
struct MergeClaim {
    merging: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for MergeClaim {
    fn drop(&mut self) {
        self.merging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Builds the router for both endpoints.
pub fn router(state: AppState) -> Router {
    // Multipart framing adds a little on top of the payload itself.
    let body_limit = state.max_chunk_bytes.saturating_add(64 * 1024);
    Router::new()
        .route(UPLOAD_PATH, post(upload))
        .route(MERGE_PATH, post(merge))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ============================================================================
// Upload
// ============================================================================

/// Why an upload request produced no chunk.
#[derive(Debug)]
enum UploadFailure {
    Malformed(String),
    Store(ServerError),
}

impl IntoResponse for UploadFailure {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Malformed(reason) => {
                warn!(%reason, "rejected chunk upload");
                StatusCode::BAD_REQUEST
            }
            Self::Store(ServerError::InvalidName(reason)) => {
                warn!(%reason, "rejected chunk upload");
                StatusCode::BAD_REQUEST
            }
            Self::Store(e) => {
                error!("failed to stage chunk: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, REPLY_UPLOAD_FAILED).into_response()
    }
}

/// POST /upload
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<&'static str, UploadFailure> {
    let multipart = multipart.map_err(|e| UploadFailure::Malformed(e.body_text()))?;
    let (name, index, payload) = read_chunk(multipart).await?;

    let result = state
        .store()
        .accept(&name, index, &payload)
        .await
        .map_err(UploadFailure::Store)?;
    Ok(StoreResult::reply(result).as_str())
}

/// Pulls the three fields out of an upload form. Unknown fields are
/// ignored; field order does not matter.
async fn read_chunk(mut multipart: Multipart) -> Result<(String, u64, Vec<u8>), UploadFailure> {
    let mut payload = None;
    let mut index = None;
    let mut name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadFailure::Malformed(e.body_text()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some(FIELD_CHUNK) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| UploadFailure::Malformed(e.body_text()))?;
                payload = Some(bytes.to_vec());
            }
            Some(FIELD_INDEX) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadFailure::Malformed(e.body_text()))?;
                let parsed = text.trim().parse::<u64>().map_err(|_| {
                    UploadFailure::Malformed(format!("{FIELD_INDEX} is not an index: {text:?}"))
                })?;
                index = Some(parsed);
            }
            Some(FIELD_NAME) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadFailure::Malformed(e.body_text()))?;
                name = Some(text);
            }
            _ => {}
        }
    }

    match (name, index, payload) {
        (Some(name), Some(index), Some(payload)) => Ok((name, index, payload)),
        (name, index, payload) => {
            let missing: Vec<_> = [
                (name.is_none(), FIELD_NAME),
                (index.is_none(), FIELD_INDEX),
                (payload.is_none(), FIELD_CHUNK),
            ]
            .into_iter()
            .filter_map(|(absent, field)| absent.then_some(field))
            .collect();
            Err(UploadFailure::Malformed(format!(
                "missing field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

// ============================================================================
// Merge
// ============================================================================

fn merge_reply(status: StatusCode, body: MergeResponse) -> (StatusCode, Json<MergeResponse>) {
    (status, Json(body))
}

/// POST /merge
async fn merge(
    State(state): State<AppState>,
    request: Result<Json<MergeRequest>, JsonRejection>,
) -> (StatusCode, Json<MergeResponse>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(e) => {
            warn!("rejected merge request: {}", e.body_text());
            return merge_reply(
                StatusCode::BAD_REQUEST,
                MergeResponse::failure(merge_code::BAD_REQUEST, e.body_text()),
            );
        }
    };
    let name = request.filename;

    let Some(_claim) = state.claim_merge(&name) else {
        warn!(file = %name, "merge already in progress");
        return merge_reply(
            StatusCode::CONFLICT,
            MergeResponse::failure(merge_code::BUSY, format!("merge of {name} already in progress")),
        );
    };

    match state.engine().merge(&name).await {
        Ok(_) => merge_reply(StatusCode::OK, MergeResponse::success()),
        Err(e) => {
            let (status, code) = match &e {
                ServerError::NoChunksFound(_) => (StatusCode::NOT_FOUND, merge_code::NO_CHUNKS),
                ServerError::InvalidName(_) => (StatusCode::BAD_REQUEST, merge_code::INVALID_NAME),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, merge_code::IO),
            };
            if status.is_server_error() {
                error!(file = %name, "merge failed: {e}");
            } else {
                warn!(file = %name, "merge rejected: {e}");
            }
            merge_reply(status, MergeResponse::failure(code, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let engine = ReassemblyEngine::new(
            ChunkStore::new(dir.path().join("temp")),
            dir.path().join("target"),
        );
        (dir, AppState::new(engine, 1024))
    }

    #[test]
    fn merge_claim_is_exclusive_per_name() {
        let (_dir, state) = state();
        let claim = state.claim_merge("a.bin").unwrap();
        assert!(state.claim_merge("a.bin").is_none());
        assert!(state.claim_merge("b.bin").is_some());

        drop(claim);
        assert!(state.claim_merge("a.bin").is_some());
    }

    #[tokio::test]
    async fn concurrent_merge_is_rejected() {
        let (_dir, state) = state();
        state.store().accept("a.bin", 0, b"x").await.unwrap();
        let _claim = state.claim_merge("a.bin").unwrap();

        let (status, Json(reply)) = merge(
            State(state.clone()),
            Ok(Json(MergeRequest::new("a.bin"))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(reply.code, merge_code::BUSY);
        // The staged chunk is untouched.
        assert_eq!(state.store().staged("a.bin").await.unwrap().len(), 1);
    }
}
