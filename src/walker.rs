// src/walker.rs
//!
//! # Walker
//!
//! Depth-first traversal in OS directory-entry order. Yields absolute paths
//! of files that survive the ignore-dir set, the ignore-rule chain, the
//! image/binary classification, and the size limit. Runs on a blocking
//! thread; the orchestrator drives it via `tokio::task::spawn_blocking`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::DigestError;
use crate::ignore_chain::IgnoreChain;
use crate::registry::Registry;

/// Walks `root`, pushing eligible absolute paths into `tx` via
/// `blocking_send` (this function is meant to run inside
/// `spawn_blocking`). Returns an error only if the root cannot be resolved.
pub fn run(
    root: &Path,
    settings: &Settings,
    registry: &Registry,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<PathBuf>,
) -> Result<(), DigestError> {
    let root = root.canonicalize().map_err(|e| DigestError::FileSystem {
        path: Some(root.to_path_buf()),
        message: "failed to resolve walk root".to_string(),
        cause: Some(e),
    })?;

    let ignore_dirs: HashSet<String> = settings.ignore_directories.iter().cloned().collect();
    let chain = IgnoreChain::empty().extend_for_dir(&root);
    walk_dir(&root, &chain, &ignore_dirs, settings, registry, cancel, tx);
    Ok(())
}

fn walk_dir(
    dir: &Path,
    chain: &IgnoreChain,
    ignore_dirs: &HashSet<String>,
    settings: &Settings,
    registry: &Registry,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<PathBuf>,
) {
    if cancel.is_cancelled() {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(path = ?dir, error = %err, "failed to read directory, skipping subtree");
            return;
        }
    };

    for entry in entries {
        if cancel.is_cancelled() {
            return;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = ?dir, error = %err, "failed to read directory entry");
                continue;
            }
        };
        let path = entry.path();

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(err) => {
                tracing::warn!(path = ?path, error = %err, "failed to stat entry");
                continue;
            }
        };

        if file_type.is_dir() {
            let name = entry.file_name().to_string_lossy().to_string();
            if ignore_dirs.contains(&name) {
                continue;
            }
            if chain.is_ignored(&path, true) {
                continue;
            }
            let child_chain = chain.extend_for_dir(&path);
            walk_dir(&path, &child_chain, ignore_dirs, settings, registry, cancel, tx);
            continue;
        }

        let is_regular = if file_type.is_symlink() {
            std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
        } else {
            file_type.is_file()
        };
        if !is_regular {
            continue;
        }

        if chain.is_ignored(&path, false) {
            continue;
        }

        if registry.is_image(&path) || registry.is_binary(&path) {
            continue;
        }

        let size = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                tracing::warn!(path = ?path, error = %err, "failed to stat file, skipping");
                continue;
            }
        };
        if size > settings.file_size_limit {
            DigestError::Validation {
                path: Some(path.clone()),
                message: "file exceeds configured size limit".to_string(),
            }
            .log(&Default::default());
            continue;
        }

        if settings.backpressure.enabled && settings.backpressure.max_pending_files > 0 {
            let capacity = settings.backpressure.max_pending_files;
            if crate::backpressure::is_queue_full(tx, capacity) {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
        }

        if tx.blocking_send(path).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::fs;
    use tempfile::tempdir;

    fn collect(root: &Path, settings: &Settings) -> Vec<PathBuf> {
        let registry = Registry::default_for_test();
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let root = root.to_path_buf();
        let settings = settings.clone();
        std::thread::spawn(move || {
            run(&root, &settings, &registry, &cancel, &tx).unwrap();
        });
        let mut out = Vec::new();
        while let Some(p) = block_on_recv(&mut rx) {
            out.push(p);
        }
        out
    }

    fn block_on_recv(rx: &mut mpsc::Receiver<PathBuf>) -> Option<PathBuf> {
        let rt = tokio::runtime::Handle::try_current();
        match rt {
            Ok(handle) => handle.block_on(rx.recv()),
            Err(_) => {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(rx.recv())
            }
        }
    }

    #[test]
    fn walks_eligible_files_and_skips_images() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.go"), "package a").unwrap();
        fs::write(dir.path().join("b.png"), [0u8; 8]).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.py"), "print(1)").unwrap();

        let settings = Settings::default();
        let mut got = collect(dir.path(), &settings);
        got.sort();

        let names: Vec<String> = got
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"a.go".to_string()));
        assert!(names.contains(&"c.py".to_string()));
        assert!(!names.contains(&"b.png".to_string()));
    }

    #[test]
    fn skips_configured_ignore_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.js"), "x").unwrap();
        fs::write(dir.path().join("keep.js"), "x").unwrap();

        let settings = Settings::default();
        let got = collect(dir.path(), &settings);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn respects_gitignore() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.txt\n").unwrap();
        fs::write(dir.path().join("x.go"), "package x").unwrap();
        fs::write(dir.path().join("y.txt"), "ignored").unwrap();

        let settings = Settings::default();
        let got = collect(dir.path(), &settings);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].file_name().unwrap(), "x.go");
    }

    #[test]
    fn excludes_files_over_size_limit() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.bin.go"), vec![0u8; 10]).unwrap();

        let mut settings = Settings::default();
        settings.file_size_limit = 5;
        let got = collect(dir.path(), &settings);
        assert!(got.is_empty());
    }
}
