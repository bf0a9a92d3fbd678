//! CLI module for ratelens - command-line interface and subcommands.

pub mod commands;

pub use commands::{CacheCommands, Cli, Commands};
