//! chunkup upload client entry point.
//!
//! Uploads one file and asks the server to merge it. Ctrl-C pauses the
//! transfer; Enter resumes it, a second Ctrl-C gives up.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chunkup_protocol::constants::DEFAULT_CHUNK_SIZE;
use chunkup_uploader::{TransferEvent, Uploader, UploaderConfig, upload_name};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// chunkup upload - sends a file to a chunkup server in resumable chunks.
#[derive(Debug, Parser)]
#[command(name = "chunkup-upload", version, about)]
struct Cli {
    /// File to upload
    file: PathBuf,

    /// Server base URL
    #[arg(short = 's', long = "server", default_value = "http://localhost:3000")]
    server: String,

    /// Bytes per chunk
    #[arg(long = "chunk-size", value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Maximum simultaneous chunk requests (unbounded if omitted)
    #[arg(long = "max-in-flight", value_name = "N")]
    max_in_flight: Option<usize>,

    /// Resume a failed transfer this many times before giving up
    #[arg(long = "retries", default_value_t = 0)]
    retries: u32,

    /// Delay before each retry, in milliseconds
    #[arg(long = "retry-backoff-ms", value_name = "MS", default_value_t = 500)]
    retry_backoff_ms: u64,
}

impl Cli {
    fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            server_url: self.server.clone(),
            chunk_size: self.chunk_size,
            max_in_flight: self.max_in_flight,
            retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let uploader = Uploader::new(cli.uploader_config())?;
    let name = upload_name(&cli.file)?;

    let mut orch = uploader.orchestrator(name.as_str());
    if let Some(events) = orch.take_events() {
        tokio::spawn(report_progress(events));
    }

    let upload = uploader.upload_with(&orch, &cli.file);
    tokio::pin!(upload);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut paused = false;

    loop {
        tokio::select! {
            result = &mut upload => {
                let reply = result.with_context(|| format!("uploading {}", cli.file.display()))?;
                tracing::info!(file = %name, message = %reply.message, "upload finished");
                return Ok(());
            }

            _ = tokio::signal::ctrl_c() => {
                if paused {
                    anyhow::bail!(
                        "upload of {name} abandoned with {} chunk(s) pending",
                        orch.pending().len()
                    );
                }
                orch.pause();
                paused = true;
                tracing::info!(
                    pending = orch.pending().len(),
                    "paused; press Enter to resume or Ctrl-C to quit"
                );
            }

            line = stdin.next_line(), if paused => {
                if let Err(e) = line {
                    tracing::warn!("reading stdin: {e}");
                }
                paused = false;
                orch.resume();
            }
        }
    }
}

/// Logs transfer events until the orchestrator goes away.
async fn report_progress(mut events: mpsc::Receiver<TransferEvent>) {
    let mut chunks = 0u64;
    let mut bytes = 0u64;

    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::ChunkAcked {
                index,
                bytes: len,
                duplicate,
            } => {
                chunks += 1;
                bytes += len;
                tracing::debug!(index, duplicate, chunks, bytes, "chunk acknowledged");
            }
            TransferEvent::ChunkFailed { index, error } => {
                tracing::warn!(index, "chunk failed: {error}");
            }
            TransferEvent::ChunkCancelled { index } => {
                tracing::debug!(index, "chunk cancelled");
            }
            TransferEvent::Paused { cancelled } => {
                tracing::info!(cancelled, "in-flight chunks aborted");
            }
            TransferEvent::Resumed { reissued } => {
                tracing::info!(reissued, "resending pending chunks");
            }
            TransferEvent::Completed { chunks, bytes } => {
                tracing::info!(chunks, bytes, "all chunks acknowledged");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_uploader_defaults() {
        let cli = Cli::try_parse_from(["chunkup-upload", "movie.mp4"]).unwrap();
        let config = cli.uploader_config();
        let defaults = UploaderConfig::default();

        assert_eq!(config.server_url, defaults.server_url);
        assert_eq!(config.chunk_size, defaults.chunk_size);
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.retries, 0);
        assert_eq!(config.retry_backoff, defaults.retry_backoff);
    }

    #[test]
    fn arguments_override_defaults() {
        let cli = Cli::try_parse_from([
            "chunkup-upload",
            "--server",
            "http://files.local:8080",
            "--chunk-size",
            "1048576",
            "--max-in-flight",
            "4",
            "--retries",
            "3",
            "/data/movie.mp4",
        ])
        .unwrap();
        let config = cli.uploader_config();

        assert_eq!(cli.file, PathBuf::from("/data/movie.mp4"));
        assert_eq!(config.server_url, "http://files.local:8080");
        assert_eq!(config.chunk_size, 1_048_576);
        assert_eq!(config.max_in_flight, Some(4));
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["chunkup-upload"]).is_err());
    }
}
