//! HTTP uploader: split, transmit, merge.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chunkup_protocol::constants::{MERGE_PATH, UPLOAD_PATH};
use chunkup_protocol::{MergeRequest, MergeResponse};
use chunkup_transfer::{TransferError, split_file, validate_file_name};
use tracing::{info, warn};

use crate::error::UploadError;
use crate::orchestrator::TransferOrchestrator;
use crate::transmitter::HttpTransmitter;
use crate::types::{SessionComplete, UploaderConfig};

/// Uploads files to a chunkup server.
pub struct Uploader {
    http: reqwest::Client,
    config: UploaderConfig,
    upload_url: String,
    merge_url: String,
}

impl Uploader {
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        if config.chunk_size == 0 {
            return Err(TransferError::InvalidConfiguration("chunk size must be positive".into()).into());
        }
        let base = config.server_url.trim_end_matches('/');
        let upload_url = format!("{base}{UPLOAD_PATH}");
        let merge_url = format!("{base}{MERGE_PATH}");
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            config,
            upload_url,
            merge_url,
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Creates an orchestrator that sends chunks of `file_name` to this
    /// server. Use it with [`upload_with`](Self::upload_with) when the
    /// caller needs to pause, resume or watch events.
    pub fn orchestrator(&self, file_name: impl Into<Arc<str>>) -> TransferOrchestrator {
        let transmitter = Arc::new(HttpTransmitter::new(
            self.http.clone(),
            self.upload_url.clone(),
        ));
        let orch = TransferOrchestrator::new(file_name, self.config.chunk_size, transmitter);
        match self.config.max_in_flight {
            Some(limit) => orch.with_max_in_flight(limit),
            None => orch,
        }
    }

    /// Uploads `path` under its own file name and asks the server to
    /// merge it.
    pub async fn upload_file(&self, path: &Path) -> Result<MergeResponse, UploadError> {
        let name = upload_name(path)?;
        let orch = self.orchestrator(name);
        self.upload_with(&orch, path).await
    }

    /// Runs the full pipeline on a caller-provided orchestrator.
    ///
    /// A failed session is resumed up to `retries` times, waiting
    /// `retry_backoff` before each attempt. The merge is only requested
    /// once every chunk is acknowledged.
    pub async fn upload_with(
        &self,
        orch: &TransferOrchestrator,
        path: &Path,
    ) -> Result<MergeResponse, UploadError> {
        let plan = split_file(path, self.config.chunk_size).await?;
        info!(
            path = %path.display(),
            bytes = plan.total_len(),
            chunks = plan.len(),
            chunk_size = plan.chunk_size(),
            "uploading"
        );

        let outcome = orch.start(plan.chunks()).await;
        let done = retry_failed(
            orch,
            outcome,
            self.config.retries,
            self.config.retry_backoff,
        )
        .await?;

        info!(file = %done.file_name, chunks = done.chunks, bytes = done.bytes, "all chunks sent");
        self.merge(&done.file_name).await
    }

    /// Asks the server to reassemble `file_name` from its staged chunks.
    pub async fn merge(&self, file_name: &str) -> Result<MergeResponse, UploadError> {
        let request = MergeRequest {
            filename: file_name.to_string(),
            size: Some(self.config.chunk_size),
        };

        let resp = self.http.post(&self.merge_url).json(&request).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let parsed = serde_json::from_str::<MergeResponse>(&body);
        match parsed {
            Ok(reply) if status.is_success() && reply.is_success() => {
                info!(file = file_name, "merged");
                Ok(reply)
            }
            Ok(reply) => Err(UploadError::Merge {
                code: reply.code,
                message: reply.message,
            }),
            Err(_) if !status.is_success() => Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resumes a failed session up to `retries` times.
///
/// A session the caller paused during the backoff stays paused: the retry
/// waits for the caller's own `resume` instead of overriding it.
async fn retry_failed(
    orch: &TransferOrchestrator,
    mut outcome: Result<SessionComplete, UploadError>,
    retries: u32,
    backoff: Duration,
) -> Result<SessionComplete, UploadError> {
    let mut attempt = 0;
    loop {
        match outcome {
            Ok(done) => return Ok(done),
            Err(err @ UploadError::Transmission { .. }) if attempt < retries => {
                attempt += 1;
                warn!(error = %err, retry = attempt, of = retries, "resuming after failure");
                tokio::time::sleep(backoff).await;
                if orch.is_paused() {
                    info!(file = %orch.file_name(), "paused during backoff; waiting for resume");
                } else {
                    orch.resume();
                }
                outcome = orch.completion().await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// The name a file is uploaded under: its final path component.
pub fn upload_name(path: &Path) -> Result<String, UploadError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::InvalidPath(format!("no usable file name: {}", path.display())))?;
    validate_file_name(name)?;
    Ok(name.to_string())
}
