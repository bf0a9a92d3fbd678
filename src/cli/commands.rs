//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - enrich: rate every entity listed in a file or on stdin
//! - cache: inspect and maintain the local cache

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::report::SortKey;

/// ratelens - employer ratings and financials for a list of names
#[derive(Parser, Debug)]
#[command(name = "ratelens")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enrich entities read from FILE (or stdin), one per line: name[<TAB>id[<TAB>title[<TAB>link[<TAB>location]]]]
    Enrich {
        /// Input file; stdin when omitted
        file: Option<PathBuf>,

        /// Sort the result table
        #[arg(short, long, value_enum, default_value_t = SortKey::Name)]
        sort: SortKey,

        /// Reverse the sort order
        #[arg(short, long)]
        desc: bool,

        /// Run one retry sweep over failed lookups before printing
        #[arg(short, long)]
        retry_failed: bool,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// List cached entries
    List {
        #[arg(short, long, value_enum, default_value_t = SortKey::Name)]
        sort: SortKey,

        #[arg(short, long)]
        desc: bool,
    },

    /// Show one entry
    Show {
        /// Entity name
        name: String,
    },

    /// Expire the rating of one entry so the next run refetches it
    Expire {
        /// Entity name
        name: String,
    },

    /// Delete every cached entry
    Reset,
}
