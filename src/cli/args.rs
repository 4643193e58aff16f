//! Command line argument parsing for the quiver CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Quiver - block-tree term dictionaries with automaton intersection
#[derive(Parser, Debug, Clone)]
#[command(name = "quiver")]
#[command(about = "Build, inspect and query block-tree term dictionaries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct QuiverArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Codec configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl QuiverArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a segment from a term or document list
    Build(BuildArgs),

    /// Look up one term
    Lookup(LookupArgs),

    /// List the terms starting with a prefix
    Prefix(PrefixArgs),

    /// List the terms matching a regular expression
    Regex(RegexArgs),

    /// Show block statistics of a segment
    Stats(StatsArgs),

    /// Merge segments into a new one
    Merge(MergeArgs),
}

/// Arguments for building a segment
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Directory holding the segment files
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    /// Segment name
    #[arg(value_name = "SEGMENT")]
    pub segment: String,

    /// Input file, one term per line (stdin when omitted)
    #[arg(short, long, value_name = "INPUT_FILE")]
    pub input: Option<PathBuf>,

    /// Read `doc_id<TAB>term<TAB>term...` lines instead of bare terms
    #[arg(long)]
    pub documents: bool,
}

/// Arguments for looking up a term
#[derive(Parser, Debug, Clone)]
pub struct LookupArgs {
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    #[arg(value_name = "SEGMENT")]
    pub segment: String,

    /// Term to look up
    #[arg(value_name = "TERM")]
    pub term: String,

    /// Also print the postings of the term
    #[arg(short, long)]
    pub postings: bool,
}

/// Arguments for a prefix listing
#[derive(Parser, Debug, Clone)]
pub struct PrefixArgs {
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    #[arg(value_name = "SEGMENT")]
    pub segment: String,

    #[arg(value_name = "PREFIX")]
    pub prefix: String,

    /// Maximum number of terms to print
    #[arg(short, long, default_value = "100")]
    pub limit: usize,
}

/// Arguments for a regular expression listing
#[derive(Parser, Debug, Clone)]
pub struct RegexArgs {
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    #[arg(value_name = "SEGMENT")]
    pub segment: String,

    /// Pattern matched against whole terms
    #[arg(value_name = "PATTERN")]
    pub pattern: String,

    /// Only list terms after this one
    #[arg(long, value_name = "TERM")]
    pub start_term: Option<String>,

    /// Maximum number of terms to print
    #[arg(short, long, default_value = "100")]
    pub limit: usize,
}

/// Arguments for segment statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    #[arg(value_name = "SEGMENT")]
    pub segment: String,
}

/// Arguments for merging segments
#[derive(Parser, Debug, Clone)]
pub struct MergeArgs {
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    /// Name of the merged segment
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Segments to merge, in document order
    #[arg(value_name = "SEGMENTS", required = true, num_args = 1..)]
    pub segments: Vec<String>,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
