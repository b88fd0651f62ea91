// src/orchestrator.rs
//!
//! # Orchestrator
//!
//! Creates the queues, spawns the writer/processor/walker tasks, and joins
//! on termination. Close propagates file queue -> write queue -> done
//! signal, exactly the order the rest of the pipeline assumes.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::backpressure::Manager as BackpressureManager;
use crate::config::Settings;
use crate::error::DigestError;
use crate::registry::Registry;
use crate::resource::Monitor;
use crate::writer::{self, Format, Sink, WriteRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub files_written: u64,
}

/// Runs the full ingestion pipeline against `root`, writing the aggregated
/// artifact for `format` into `sink`. `cancel` is the parent context: the
/// caller (a signal handler, a deadline, a test) cancels it from outside to
/// unwind every blocking call in the pipeline. The overall-timeout budget in
/// `settings.resource_limits` is wired to the same token, so a run that
/// outlives its deadline cancels itself the same way an external caller would.
pub async fn run(
    settings: Settings,
    root: PathBuf,
    format: Format,
    mut sink: Sink,
    cancel: CancellationToken,
) -> Result<RunStats, DigestError> {
    let registry: &'static Registry = crate::registry::global();
    let monitor = Monitor::new(settings.resource_limits.clone());
    let backpressure = Arc::new(BackpressureManager::new(
        settings.backpressure.clone(),
        monitor.shared_system(),
    ));

    if let Some(timeout) = monitor.overall_timeout() {
        let deadline_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = deadline_cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(?timeout, "overall timeout elapsed, cancelling run");
                    deadline_cancel.cancel();
                }
            }
        });
    }

    let ((file_tx, file_rx), (write_tx, mut write_rx)) =
        backpressure.create_channels::<PathBuf, WriteRequest>();
    let file_rx = Arc::new(AsyncMutex::new(file_rx));

    let writer_task = {
        let mut writer_impl = writer::for_format(format);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut count: u64 = 0;
            writer_impl.start(&mut sink, "", "").await?;
            while let Some(req) = write_rx.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                writer_impl.write_file(&mut sink, req).await?;
                count += 1;
            }
            writer_impl.close(&mut sink).await?;
            Ok::<u64, DigestError>(count)
        })
    };

    let worker_count = settings.resource_limits.max_concurrent_reads.max(1);
    let mut processor_tasks = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let root = root.clone();
        let settings = settings.clone();
        let monitor = Arc::clone(&monitor);
        let backpressure = Arc::clone(&backpressure);
        let cancel = cancel.clone();
        let write_tx = write_tx.clone();
        let file_rx = Arc::clone(&file_rx);

        processor_tasks.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let path = {
                    let mut guard = file_rx.lock().await;
                    guard.recv().await
                };
                let path = match path {
                    Some(p) => p,
                    None => break,
                };

                if backpressure.should_apply_backpressure() {
                    backpressure.apply_backpressure(&cancel).await;
                }

                crate::processor::process_one(
                    path, &root, &settings, registry, &monitor, &backpressure, &cancel, &write_tx,
                )
                .await;
            }
        }));
    }
    // Drop the orchestrator's own write-queue handle; the write queue closes
    // once every processor's clone is also dropped at task exit.
    drop(write_tx);

    let walker_settings = settings.clone();
    let walker_root = root.clone();
    let walker_cancel = cancel.clone();
    let walk_result = tokio::task::spawn_blocking(move || {
        crate::walker::run(&walker_root, &walker_settings, registry, &walker_cancel, &file_tx)
    })
    .await
    .map_err(|e| DigestError::Processing {
        path: None,
        message: format!("walker task panicked: {e}"),
    })?;

    for handle in processor_tasks {
        let _ = handle.await;
    }

    let files_written = writer_task
        .await
        .map_err(|e| DigestError::Processing {
            path: None,
            message: format!("writer task panicked: {e}"),
        })??;

    monitor.close();
    walk_result?;

    Ok(RunStats { files_written })
}
