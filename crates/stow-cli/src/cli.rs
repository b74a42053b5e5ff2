use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stow_blob::DigestAlgorithm;

#[derive(Parser)]
#[command(
    name = "stow",
    about = "Stow blob store maintenance",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Blob store root, overriding the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read and write blobs
    Blob(BlobArgs),
    /// Print the content digest of a file
    Digest(DigestArgs),
    /// Show the effective configuration
    Config,
}

#[derive(Args)]
pub struct BlobArgs {
    #[command(subcommand)]
    pub action: BlobAction,
}

#[derive(Subcommand)]
pub enum BlobAction {
    /// Store a file. Without --key the key is the content digest.
    Put {
        file: PathBuf,
        #[arg(long)]
        key: Option<String>,
    },
    /// Write a blob to --out, or to stdout
    Get {
        key: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check whether a blob exists
    Exists { key: String },
    /// Delete a blob
    Delete { key: String },
    /// Print where a blob lives on disk
    Path { key: String },
    /// Verify a content-addressed blob against its key
    Verify { key: String },
    /// Remove temp files abandoned by interrupted writes
    Scavenge {
        /// Minimum age in seconds; defaults to the configured threshold
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
    /// Delete every blob under the root
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
pub struct DigestArgs {
    pub file: PathBuf,
    /// Digest algorithm; defaults to the configured one
    #[arg(long)]
    pub algorithm: Option<DigestAlgorithm>,
}
