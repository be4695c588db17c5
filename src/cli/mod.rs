//! CLI module for headless-host - command-line interface and subcommands.
//!
//! Provides dry-run app loading, linking URI inspection, and access to the
//! persisted experience metadata and task registrations.

pub mod commands;

pub use commands::Cli;
