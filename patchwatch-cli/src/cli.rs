use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use patchwatch::{PatchStatus, Severity};

/// Track security patches published by advisory feeds, pages and APIs
#[derive(Parser)]
#[command(name = "patchwatch", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// JSON file holding the tracked patch records
    #[arg(long, global = true, env = "PATCHWATCH_STORE", default_value = "patches.json")]
    pub store: PathBuf,

    /// Output results as JSON on stdout and structured logs on stderr
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch configured sources and merge new advisories into the store
    Fetch(FetchArgs),
    /// List tracked patches
    List(ListArgs),
    /// Change the status of a tracked patch
    Status {
        id: String,
        /// pending, applied or not_applicable
        status: PatchStatus,
        /// Replace the record's notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Merge records from a previously exported JSON file
    Import { file: PathBuf },
    /// Write every tracked record as a JSON array
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Stop tracking a patch
    Remove { id: String },
}

#[derive(Args)]
pub struct FetchArgs {
    /// YAML or JSON file listing the sources to ingest
    #[arg(short, long)]
    pub sources: PathBuf,

    /// Only ingest the named source (repeatable)
    #[arg(long = "source", value_name = "NAME")]
    pub only: Vec<String>,

    /// Bearer token for api sources (falls back to GITHUB_TOKEN)
    #[arg(long, env = "PATCHWATCH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Maximum number of sources fetched at once
    #[arg(long, default_value_t = 10)]
    pub max_concurrency: usize,

    /// Relay base url for rss and html sources; the target is passed as ?url=
    #[arg(long, env = "PATCHWATCH_RELAY")]
    pub relay: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub severity: Option<Severity>,

    #[arg(long)]
    pub status: Option<PatchStatus>,

    /// Case-insensitive match on the tool name
    #[arg(long)]
    pub tool: Option<String>,
}
