//!
//! # dirdigest
//!
//! Walks a source directory under resource budgets and streams surviving
//! files into one aggregated Markdown, JSON, or YAML artifact.
//!
//! ## Organization
//! - **error**: the ingestion error taxonomy
//! - **registry**: file-type classification cache (image/binary/language)
//! - **ignore_chain**: per-directory `.gitignore`/`.ignore` inheritance
//! - **config**: `Settings` and its TOML loader
//! - **resource**: the resource monitor (limits, read slots, rate limiting)
//! - **backpressure**: queue-fill and memory-pressure sensing
//! - **walker**: directory traversal
//! - **processor**: per-file read/classify/dispatch pipeline
//! - **writer**: the three output-format writers
//! - **orchestrator**: wires the above into the walker/processor/writer pipeline
//! - **cli**: the ambient command-line surface

pub mod backpressure;
pub mod cli;
pub mod config;
pub mod error;
pub mod ignore_chain;
pub mod orchestrator;
pub mod processor;
pub mod registry;
pub mod resource;
pub mod walker;
pub mod writer;
