//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::index::IndexArgs;
use crate::commands::line::LineArgs;
use crate::commands::matching::MatchArgs;
use crate::commands::sync::SyncArgs;
use crate::commands::time::TimeArgs;

/// Timeline explorer for log files.
///
/// Extracts per-line timestamps, indexes configured events into a tree and
/// lines up several logs on a common clock.
#[derive(Debug, Parser)]
#[command(name = "lt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file (TOML, or JSON by extension).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the event tree, decorations and time-sync fingerprints of a file.
    Index(IndexArgs),

    /// Show the calculated time of a line.
    Time(TimeArgs),

    /// Find the line to reveal for a point in time.
    Line(LineArgs),

    /// Show which file config a file is matched to.
    Match(MatchArgs),

    /// Synchronize the clocks of several files via their fingerprints.
    Sync(SyncArgs),
}
