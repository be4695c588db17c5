//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - load: dry-run load of an app, printing the launch props
//! - linking-uri: compute the linking URI for a manifest URL
//! - metadata: show or set persisted experience metadata
//! - tasks: list or unregister persisted background tasks

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// headless-host - load JavaScript apps into a native runtime without a UI
#[derive(Parser, Debug)]
#[command(name = "headless-host")]
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
    /// Load an app against the dry-run runtime and print what it would receive
    Load {
        /// Manifest URL (exp://, exps://, http:// or https://)
        url: String,

        /// URI the app is opened with
        #[arg(long)]
        intent_uri: Option<String>,

        /// Read the manifest from a local file instead of fetching it
        #[arg(long, requires = "bundle_file")]
        manifest_file: Option<PathBuf>,

        /// Local bundle to use with --manifest-file
        #[arg(long)]
        bundle_file: Option<PathBuf>,

        /// Load without a foreground surface (no runtime is built)
        #[arg(long)]
        background: bool,
    },

    /// Print the linking URI an app would get
    LinkingUri {
        /// Manifest URL
        url: String,

        /// SDK version of the app (e.g. 28.0.0 or UNVERSIONED)
        #[arg(long)]
        sdk: String,
    },

    /// Persisted per-experience metadata
    Metadata {
        #[command(subcommand)]
        command: MetadataCommands,
    },

    /// Persisted background tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

/// Metadata subcommands
#[derive(Subcommand, Debug)]
pub enum MetadataCommands {
    /// Show metadata for an experience
    Show {
        /// Experience id (@owner/slug)
        experience_id: String,
    },

    /// Replace metadata for an experience
    Set {
        /// Experience id (@owner/slug)
        experience_id: String,

        /// JSON object to store
        json: String,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List registered tasks
    List {
        /// Only tasks of this app
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Unregister one task, or every task of an app
    Unregister {
        /// Owning app id
        app: String,

        /// Task name; omit to unregister all tasks of the app
        name: Option<String>,
    },
}
