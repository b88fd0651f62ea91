//!
//! # Command-Line Interface
//!
//! Thin `clap` shim: parses flags, merges them over a loaded [`Settings`],
//! and hands the result to [`crate::orchestrator::run`]. None of this
//! module's logic is part of the core pipeline's contract.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::writer::Format;

#[derive(Debug, Parser)]
#[command(name = "dirdigest", version, about = "Aggregate a directory tree into one Markdown, JSON, or YAML artifact")]
pub struct Cli {
    /// Directory to walk.
    #[arg(default_value = ".")]
    pub source_dir: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "markdown")]
    pub format: Format,

    /// Write the artifact here instead of stdout.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Path to a `dirdigest.toml` config file.
    #[arg(short, long, default_value = "dirdigest.toml")]
    pub config: PathBuf,

    /// Skip files larger than this many bytes.
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Extra directory names to ignore, in addition to the configured defaults.
    #[arg(long = "ignore")]
    pub ignore_directories: Vec<String>,

    /// Disable resource limiting entirely.
    #[arg(long)]
    pub no_resource_limits: bool,

    /// Disable backpressure (queue-fill and memory sampling).
    #[arg(long)]
    pub no_backpressure: bool,
}

// Implemented by hand rather than `#[derive(clap::ValueEnum)]` on `Format`
// itself: `Format` lives in the core `writer` module, which must not depend
// on `clap` types.
impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Format::Markdown, Format::Json, Format::Yaml]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Format::Markdown => clap::builder::PossibleValue::new("markdown"),
            Format::Json => clap::builder::PossibleValue::new("json"),
            Format::Yaml => clap::builder::PossibleValue::new("yaml"),
        })
    }
}

impl Cli {
    /// Applies the parsed flags on top of `settings`, flag values winning.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(limit) = self.max_file_size {
            settings.file_size_limit = limit;
        }
        settings.ignore_directories.extend(self.ignore_directories.iter().cloned());
        if self.no_resource_limits {
            settings.resource_limits.enabled = false;
        }
        if self.no_backpressure {
            settings.backpressure.enabled = false;
        }
        settings
    }
}
