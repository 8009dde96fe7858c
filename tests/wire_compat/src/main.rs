fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chunkup_protocol::{MergeRequest, MergeResponse, StagingKey, UploadReply};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Merge endpoint ---

    #[test]
    fn fixture_merge_request() {
        let request: MergeRequest = roundtrip_test("merge_request.json");
        assert_eq!(request, MergeRequest::new("movie.mp4"));
    }

    #[test]
    fn fixture_merge_request_legacy() {
        // Older browser clients also send the chunk size.
        let request: MergeRequest = roundtrip_test("merge_request_legacy.json");
        assert_eq!(request.filename, "holiday photos.zip");
        assert_eq!(request.size, Some(10 * 1024 * 1024));
    }

    #[test]
    fn fixture_merge_response_success() {
        let response: MergeResponse = roundtrip_test("merge_response_success.json");
        assert_eq!(response, MergeResponse::success());
        assert!(response.is_success());
    }

    #[test]
    fn fixture_merge_response_failure() {
        let response: MergeResponse = roundtrip_test("merge_response_no_chunks.json");
        assert!(!response.is_success());
        assert_eq!(response.code, 1);
    }

    // --- Upload endpoint ---

    #[test]
    fn upload_reply_strings() {
        assert_eq!(UploadReply::Received.as_str(), "chunk received");
        assert_eq!(UploadReply::AlreadyExists.as_str(), "file chunk exist");
        assert_eq!(UploadReply::parse("chunk received\n"), Some(UploadReply::Received));
        assert_eq!(UploadReply::parse("upload file chunk failed"), None);
    }

    #[test]
    fn staging_file_pattern() {
        assert_eq!(StagingKey::new("movie.mp4", 12).file_name(), "movie-12.mp4");
        assert_eq!(
            StagingKey::new("archive.tar.gz", 0).file_name(),
            "archive.tar-0.gz"
        );
        assert_eq!(StagingKey::new("README", 3).file_name(), "README-3");
    }

    // --- End to end ---

    mod end_to_end {
        use std::net::{IpAddr, Ipv4Addr};
        use std::sync::Arc;
        use std::time::Duration;

        use chunkup_protocol::constants::UPLOAD_PATH;
        use chunkup_server::{ServerConfig, UploadServer};
        use chunkup_transfer::split_bytes;
        use chunkup_uploader::{
            Ack, HttpTransmitter, UploadError, Uploader, UploaderConfig, transmit,
        };
        use tokio_util::sync::CancellationToken;

        fn token() -> CancellationToken {
            CancellationToken::new()
        }

        struct Running {
            server: Arc<UploadServer>,
            handle: tokio::task::JoinHandle<()>,
            base: String,
            dir: tempfile::TempDir,
        }

        impl Running {
            fn merged(&self, name: &str) -> Vec<u8> {
                fs_read(self.dir.path().join("target").join(name))
            }

            fn uploader(&self, chunk_size: u64) -> Uploader {
                Uploader::new(UploaderConfig {
                    server_url: self.base.clone(),
                    chunk_size,
                    ..Default::default()
                })
                .unwrap()
            }

            async fn stop(self) {
                self.server.shutdown();
                self.handle.await.unwrap();
            }
        }

        fn fs_read(path: std::path::PathBuf) -> Vec<u8> {
            std::fs::read(&path)
                .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
        }

        async fn start() -> Running {
            let dir = tempfile::tempdir().unwrap();
            let server = UploadServer::new(ServerConfig {
                bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
                staging_dir: dir.path().join("temp"),
                target_dir: dir.path().join("target"),
                ..Default::default()
            });
            let server2 = Arc::clone(&server);
            let handle = tokio::spawn(async move {
                server2.run().await.unwrap();
            });

            // Wait for the server to bind.
            tokio::time::sleep(Duration::from_millis(50)).await;
            let port = server.port().await;
            assert!(port > 0);

            Running {
                server,
                handle,
                base: format!("http://127.0.0.1:{port}"),
                dir,
            }
        }

        fn sample(len: usize) -> Vec<u8> {
            (0..len).map(|i| (i * 31 % 251) as u8).collect()
        }

        #[tokio::test]
        async fn upload_file_reproduces_source() {
            let running = start().await;
            let data = sample(25);
            let src = running.dir.path().join("source.bin");
            std::fs::write(&src, &data).unwrap();

            let reply = running.uploader(10).upload_file(&src).await.unwrap();
            assert!(reply.is_success());
            assert_eq!(running.merged("source.bin"), data);
            running.stop().await;
        }

        #[tokio::test]
        async fn out_of_order_arrival() {
            let running = start().await;
            let data = sample(25);
            let plan = split_bytes(data.clone(), 10).unwrap();
            let transmitter = HttpTransmitter::new(
                reqwest::Client::new(),
                format!("{}{UPLOAD_PATH}", running.base),
            );

            for index in [2, 0, 1] {
                let chunk = plan.chunk(index).unwrap();
                let ack = transmit(&transmitter, chunk, "ooo.bin".into(), token())
                    .await
                    .unwrap();
                assert_eq!(ack, Ack::Stored);
            }

            running.uploader(10).merge("ooo.bin").await.unwrap();
            assert_eq!(running.merged("ooo.bin"), data);
            running.stop().await;
        }

        #[tokio::test]
        async fn duplicate_upload_is_a_no_op() {
            let running = start().await;
            let data = sample(12);
            let plan = split_bytes(data.clone(), 4).unwrap();
            let transmitter = HttpTransmitter::new(
                reqwest::Client::new(),
                format!("{}{UPLOAD_PATH}", running.base),
            );

            for chunk in plan.chunks() {
                transmit(&transmitter, chunk, "dup.bin".into(), token())
                    .await
                    .unwrap();
            }
            let again = transmit(
                &transmitter,
                plan.chunk(1).unwrap(),
                "dup.bin".into(),
                token(),
            )
            .await
            .unwrap();
            assert_eq!(again, Ack::AlreadyStaged);

            running.uploader(4).merge("dup.bin").await.unwrap();
            assert_eq!(running.merged("dup.bin"), data);
            running.stop().await;
        }

        #[tokio::test]
        async fn pause_and_resume_against_server() {
            let running = start().await;
            let data = sample(64 * 1024);
            let uploader = running.uploader(1024);
            let plan = split_bytes(data.clone(), 1024).unwrap();
            let chunks: Vec<_> = plan.chunks().collect();

            let orch = Arc::new(uploader.orchestrator("paused.bin"));
            let run = tokio::spawn({
                let orch = Arc::clone(&orch);
                async move { orch.start(chunks).await }
            });

            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(2)).await;
                orch.pause();
                tokio::time::sleep(Duration::from_millis(2)).await;
                orch.resume();
            }

            let done = tokio::time::timeout(Duration::from_secs(30), run)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(done.chunks, 64);
            assert_eq!(done.bytes, data.len() as u64);

            uploader.merge("paused.bin").await.unwrap();
            assert_eq!(running.merged("paused.bin"), data);
            running.stop().await;
        }

        #[tokio::test]
        async fn merge_without_chunks_is_reported() {
            let running = start().await;
            let err = running.uploader(10).merge("ghost.bin").await.unwrap_err();
            assert!(matches!(err, UploadError::Merge { code: 1, .. }));
            running.stop().await;
        }
    }
}
