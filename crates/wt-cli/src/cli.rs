//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Browser activity time tracker.
///
/// Reduces host-reported tab, navigation, and idle signals into classified
/// time segments and forwards accepted segments to the collector.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track activity from host events on stdin.
    ///
    /// Reads newline-delimited JSON host events (tab activation, navigation,
    /// idle transitions) and control messages (refresh, status, stop) until
    /// stop or end of input.
    Run,

    /// Show the configured policy and current shift membership.
    Status,

    /// Classify a URL against the configured policy.
    CheckUrl {
        /// The URL to classify.
        url: String,
    },
}
