// src/processor.rs
//!
//! # File Processor
//!
//! Per-file pipeline: timeout, rate-gate, admission, read-slot, hard-memory
//! check, then dispatch by size into an inline or streamed `WriteRequest`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backpressure::Manager as BackpressureManager;
use crate::config::Settings;
use crate::error::DigestError;
use crate::registry::Registry;
use crate::resource::Monitor;
use crate::writer::{InlineWrite, StreamedReader, StreamedWrite, WriteRequest};

/// Processes one path end to end and sends the resulting `WriteRequest` to
/// the write queue. Every error except a sticky emergency stop is logged and
/// swallowed: the caller simply moves on to the next path.
#[allow(clippy::too_many_arguments)]
pub async fn process_one(
    path: PathBuf,
    root: &Path,
    settings: &Settings,
    registry: &Registry,
    monitor: &Arc<Monitor>,
    backpressure: &Arc<BackpressureManager>,
    cancel: &CancellationToken,
    write_tx: &mpsc::Sender<WriteRequest>,
) {
    let result = match monitor.file_processing_timeout() {
        Some(timeout) => {
            match tokio::time::timeout(timeout, process_inner(
                &path, root, settings, registry, monitor, backpressure, cancel, write_tx,
            ))
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err(DigestError::ResourceLimitTimeout {
                    path: Some(path.clone()),
                }),
            }
        }
        None => {
            process_inner(&path, root, settings, registry, monitor, backpressure, cancel, write_tx)
                .await
        }
    };

    if let Err(err) = result {
        err.log(&Default::default());
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_inner(
    path: &Path,
    root: &Path,
    settings: &Settings,
    registry: &Registry,
    monitor: &Arc<Monitor>,
    backpressure: &Arc<BackpressureManager>,
    cancel: &CancellationToken,
    write_tx: &mpsc::Sender<WriteRequest>,
) -> Result<(), DigestError> {
    if cancel.is_cancelled() {
        return Ok(());
    }

    monitor.wait_for_rate_limit(cancel).await?;

    let metadata = tokio::fs::metadata(path).await.map_err(|e| DigestError::FileSystem {
        path: Some(path.to_path_buf()),
        message: "failed to stat file".to_string(),
        cause: Some(e),
    })?;
    let size = metadata.len();

    if size > settings.file_size_limit {
        return Err(DigestError::Validation {
            path: Some(path.to_path_buf()),
            message: "file exceeds configured size limit".to_string(),
        });
    }

    monitor.validate_file_processing(size)?;

    monitor.acquire_read_slot(cancel).await?;
    let _release = ReadSlotGuard { monitor };

    monitor.check_hard_memory_limit()?;

    if cancel.is_cancelled() {
        return Ok(());
    }

    let rel_path = path
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| path.to_string_lossy().to_string());

    let language = registry.language(path);
    let header = format!("\n---\n{rel_path}\n");

    let request = if size <= settings.stream_threshold {
        let bytes = tokio::fs::read(path).await.map_err(|e| DigestError::Io {
            path: Some(path.to_path_buf()),
            message: "failed to read file".to_string(),
            cause: Some(e),
        })?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        let content = format!(
            "{header}{}\n",
            String::from_utf8_lossy(&bytes)
        );
        WriteRequest::Inline(InlineWrite {
            path: rel_path,
            content,
            language,
            size,
        })
    } else {
        let file = tokio::fs::File::open(path).await.map_err(|e| DigestError::Io {
            path: Some(path.to_path_buf()),
            message: "failed to open file for streaming".to_string(),
            cause: Some(e),
        })?;
        let reader = StreamedReader::new(header.into_bytes(), file);
        WriteRequest::Streamed(StreamedWrite {
            path: rel_path,
            language,
            reader,
            size,
        })
    };

    backpressure
        .wait_if_full(write_tx, settings.backpressure.max_pending_writes, cancel)
        .await;

    write_tx
        .send(request)
        .await
        .map_err(|_| DigestError::Processing {
            path: Some(path.to_path_buf()),
            message: "write queue closed".to_string(),
        })?;

    monitor.record_file_processed(size);

    Ok(())
}

struct ReadSlotGuard<'a> {
    monitor: &'a Arc<Monitor>,
}

impl Drop for ReadSlotGuard<'_> {
    fn drop(&mut self) {
        self.monitor.release_read_slot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::registry::Registry;
    use std::fs;
    use tempfile::tempdir;

    fn test_settings() -> Settings {
        let mut s = Settings::default();
        s.stream_threshold = 16;
        s
    }

    #[tokio::test]
    async fn small_file_is_sent_inline() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.go"), "package a").unwrap();

        let settings = test_settings();
        let registry = Registry::default_for_test();
        let monitor = Monitor::new(settings.resource_limits.clone());
        let backpressure = Arc::new(BackpressureManager::new(
            settings.backpressure.clone(),
            monitor.shared_system(),
        ));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        process_one(
            dir.path().join("a.go"),
            dir.path(),
            &settings,
            &registry,
            &monitor,
            &backpressure,
            &cancel,
            &tx,
        )
        .await;
        drop(tx);

        let req = rx.recv().await.unwrap();
        match req {
            WriteRequest::Inline(w) => {
                assert_eq!(w.path, "a.go");
                assert!(w.content.contains("package a"));
            }
            WriteRequest::Streamed(_) => panic!("expected inline"),
        }
    }

    #[tokio::test]
    async fn large_file_is_streamed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.go"), "x".repeat(64)).unwrap();

        let settings = test_settings();
        let registry = Registry::default_for_test();
        let monitor = Monitor::new(settings.resource_limits.clone());
        let backpressure = Arc::new(BackpressureManager::new(
            settings.backpressure.clone(),
            monitor.shared_system(),
        ));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        process_one(
            dir.path().join("big.go"),
            dir.path(),
            &settings,
            &registry,
            &monitor,
            &backpressure,
            &cancel,
            &tx,
        )
        .await;
        drop(tx);

        let req = rx.recv().await.unwrap();
        assert!(matches!(req, WriteRequest::Streamed(_)));
    }

    #[tokio::test]
    async fn oversize_file_is_rejected_without_emitting() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("huge.go"), "x".repeat(64)).unwrap();

        let mut settings = test_settings();
        settings.file_size_limit = 8;
        let registry = Registry::default_for_test();
        let monitor = Monitor::new(settings.resource_limits.clone());
        let backpressure = Arc::new(BackpressureManager::new(
            settings.backpressure.clone(),
            monitor.shared_system(),
        ));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        process_one(
            dir.path().join("huge.go"),
            dir.path(),
            &settings,
            &registry,
            &monitor,
            &backpressure,
            &cancel,
            &tx,
        )
        .await;
        drop(tx);

        assert!(rx.recv().await.is_none());
    }
}
