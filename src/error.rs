//! Error taxonomy for the ingestion pipeline.
//!
//! Every per-file failure recovers locally: the worker logs it with
//! [`tracing::error!`] and moves on to the next path. Only
//! [`DigestError::ResourceLimitMemory`] with `emergency_stop` set is allowed
//! to wind down an entire run.

use std::collections::HashMap;
use std::path::PathBuf;

/// One entry of the error taxonomy. Variant names mirror the "kind" column
/// of the ingestion error table; `CLI`/`Configuration` are never produced by
/// the core pipeline and exist only so the ambient CLI/config layers can
/// surface their own failures through the same type.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("filesystem error at {path:?}: {message}")]
    FileSystem {
        path: Option<PathBuf>,
        message: String,
        #[source]
        cause: Option<std::io::Error>,
    },

    #[error("io error at {path:?}: {message}")]
    Io {
        path: Option<PathBuf>,
        message: String,
        #[source]
        cause: Option<std::io::Error>,
    },

    #[error("processing error at {path:?}: {message}")]
    Processing {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("validation error: {message}")]
    Validation {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("resource limit exceeded: max files reached")]
    ResourceLimitFiles { path: Option<PathBuf> },

    #[error("resource limit exceeded: total size budget exceeded")]
    ResourceLimitTotalSize { path: Option<PathBuf> },

    #[error("resource limit exceeded: timeout")]
    ResourceLimitTimeout { path: Option<PathBuf> },

    #[error("resource limit exceeded: memory ceiling (emergency_stop={emergency_stop})")]
    ResourceLimitMemory {
        path: Option<PathBuf>,
        emergency_stop: bool,
    },

    #[error("resource limit exceeded: concurrency")]
    ResourceLimitConcurrency { path: Option<PathBuf> },

    #[error("resource limit exceeded: rate")]
    ResourceLimitRate { path: Option<PathBuf> },

    #[error("cli error: {0}")]
    Cli(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DigestError {
    /// Stable machine-readable code, distinct from the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            DigestError::FileSystem { .. } => "filesystem",
            DigestError::Io { .. } => "io",
            DigestError::Processing { .. } => "processing",
            DigestError::Validation { .. } => "validation",
            DigestError::ResourceLimitFiles { .. } => "resource_limit_files",
            DigestError::ResourceLimitTotalSize { .. } => "resource_limit_total_size",
            DigestError::ResourceLimitTimeout { .. } => "resource_limit_timeout",
            DigestError::ResourceLimitMemory { .. } => "resource_limit_memory",
            DigestError::ResourceLimitConcurrency { .. } => "resource_limit_concurrency",
            DigestError::ResourceLimitRate { .. } => "resource_limit_rate",
            DigestError::Cli(_) => "cli",
            DigestError::Configuration(_) => "configuration",
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            DigestError::FileSystem { path, .. }
            | DigestError::Io { path, .. }
            | DigestError::Processing { path, .. }
            | DigestError::Validation { path, .. }
            | DigestError::ResourceLimitFiles { path }
            | DigestError::ResourceLimitTotalSize { path }
            | DigestError::ResourceLimitTimeout { path }
            | DigestError::ResourceLimitConcurrency { path }
            | DigestError::ResourceLimitRate { path } => path.as_ref(),
            DigestError::ResourceLimitMemory { path, .. } => path.as_ref(),
            DigestError::Cli(_) | DigestError::Configuration(_) => None,
        }
    }

    /// True for errors that only ever abort the single file they name.
    pub fn is_file_local(&self) -> bool {
        !matches!(
            self,
            DigestError::ResourceLimitMemory {
                emergency_stop: true,
                ..
            }
        )
    }

    /// Logs this error at `error` level with the structured fields the
    /// ingestion error-handling design calls for: `error_type`, `error_code`,
    /// `file_path`, and an arbitrary context map.
    pub fn log(&self, context: &HashMap<String, String>) {
        tracing::error!(
            error_type = ?self,
            error_code = self.code(),
            file_path = ?self.path(),
            ?context,
            "file processing error",
        );
    }
}
