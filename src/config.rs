// src/config.rs
//!
//! # Configuration
//!
//! `Settings` is the fully-populated configuration value the core pipeline
//! takes as input; loading it from TOML is an ambient concern the core never
//! touches directly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DigestError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceLimits {
    pub enabled: bool,
    pub max_files: u64,
    pub max_total_size: u64,
    pub file_processing_timeout_sec: u64,
    pub overall_timeout_sec: u64,
    pub max_concurrent_reads: usize,
    pub rate_limit_files_per_sec: u32,
    pub hard_memory_limit_mb: u64,
    pub enable_graceful_degradation: bool,
    pub enable_resource_monitoring: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            enabled: true,
            max_files: 100_000,
            max_total_size: 2 * 1024 * 1024 * 1024,
            file_processing_timeout_sec: 30,
            overall_timeout_sec: 600,
            max_concurrent_reads: 8,
            rate_limit_files_per_sec: 0,
            hard_memory_limit_mb: 0,
            enable_graceful_degradation: true,
            enable_resource_monitoring: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackpressureSettings {
    pub enabled: bool,
    pub max_memory_usage: u64,
    pub memory_check_interval: u64,
    pub max_pending_files: usize,
    pub max_pending_writes: usize,
}

impl Default for BackpressureSettings {
    fn default() -> Self {
        BackpressureSettings {
            enabled: true,
            max_memory_usage: 512 * 1024 * 1024,
            memory_check_interval: 50,
            max_pending_files: 256,
            max_pending_writes: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub file_size_limit: u64,
    pub ignore_directories: Vec<String>,
    pub resource_limits: ResourceLimits,
    pub backpressure: BackpressureSettings,
    pub stream_threshold: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            file_size_limit: 5 * 1024 * 1024,
            ignore_directories: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "dist".to_string(),
                "build".to_string(),
                "coverage".to_string(),
                "target".to_string(),
            ],
            resource_limits: ResourceLimits::default(),
            backpressure: BackpressureSettings::default(),
            stream_threshold: 1024 * 1024,
        }
    }
}

/// Loads `Settings` from a TOML file at `path`, falling back to defaults if
/// the file does not exist.
pub fn load(path: &Path) -> Result<Settings, DigestError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| DigestError::Configuration(
        format!("failed to read config file {}: {e}", path.display()),
    ))?;
    toml::from_str(&contents)
        .map_err(|e| DigestError::Configuration(format!("failed to parse config TOML: {e}")))
}
