//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Download and upload content through the transfer manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (default: ~/.config/content-transfer/ctm.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hide progress lines
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URI into a local file
    Download {
        uri: String,
        dest: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        replace: bool,

        /// Give up after this many seconds (0 uses the configured default)
        #[arg(short, long, default_value_t = 0)]
        timeout: u32,

        /// Report progress every N percent (0 uses the configured default)
        #[arg(short, long, default_value_t = 0)]
        progress: u8,
    },

    /// Download a URI into memory and write it to stdout
    Fetch {
        uri: String,

        /// Give up after this many seconds (0 uses the configured default)
        #[arg(short, long, default_value_t = 0)]
        timeout: u32,
    },

    /// Upload a local file to a path under the upload base URI
    Upload {
        src: PathBuf,
        dest: String,

        /// Overwrite an existing remote file
        #[arg(short, long)]
        replace: bool,

        /// Upload base URI (overrides the config file)
        #[arg(long)]
        base_uri: Option<String>,
    },
}
