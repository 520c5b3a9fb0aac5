use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "esprit")]
#[command(about = "Bulk loading, dumping and maintenance for Elasticsearch-style servers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config file
    #[arg(short, long, global = true, env = "ESPRIT_CONFIG", default_value = "esprit.json")]
    pub config: PathBuf,

    /// Server host (overrides config)
    #[arg(long, global = true, env = "ESPRIT_HOST")]
    pub host: Option<String>,

    /// Base index name (overrides config)
    #[arg(short, long, global = true, env = "ESPRIT_INDEX")]
    pub index: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a bulk payload file into chunk files without sending anything
    Split(SplitArgs),
    /// Push a bulk payload file to the server in size-bounded chunks
    Load(LoadArgs),
    /// Write every record of a type to stdout as JSON lines
    Dump(DumpArgs),
    /// Copy records of a type into another index
    Copy(CopyArgs),
    /// Inspect and prune a snapshot repository
    Snapshots(SnapshotsArgs),
}

#[derive(clap::Args)]
pub struct SplitArgs {
    /// Bulk payload file
    pub file: PathBuf,
    /// Directory for the chunk files
    #[arg(long)]
    pub out: PathBuf,
    /// Maximum chunk size in bytes (defaults to the configured bulk size)
    #[arg(long)]
    pub max_bytes: Option<usize>,
}

#[derive(clap::Args)]
pub struct LoadArgs {
    /// Bulk payload file
    pub file: PathBuf,
    /// Target type
    #[arg(short = 't', long = "type")]
    pub doc_type: String,
    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<usize>,
    /// Maximum chunk size in bytes
    #[arg(long)]
    pub max_bytes: Option<usize>,
    /// Rewrite every action line to target this index
    #[arg(long)]
    pub rewrite_index: Option<String>,
}

#[derive(clap::Args)]
pub struct DumpArgs {
    #[arg(short = 't', long = "type")]
    pub doc_type: String,
    #[arg(long)]
    pub limit: Option<u64>,
    #[arg(long)]
    pub page_size: Option<usize>,
    /// Use a server-side scroll cursor instead of offset paging
    #[arg(long)]
    pub scroll: bool,
}

#[derive(clap::Args)]
pub struct CopyArgs {
    #[arg(short = 't', long = "type")]
    pub doc_type: String,
    /// Index to copy into
    #[arg(long)]
    pub target_index: String,
    /// Type to write as (defaults to the source type)
    #[arg(long)]
    pub target_type: Option<String>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(clap::Args)]
pub struct SnapshotsArgs {
    /// Snapshot repository name
    #[arg(long)]
    pub repo: String,
    #[command(subcommand)]
    pub command: SnapshotCommands,
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// List snapshots, oldest first
    List,
    /// Fail unless today's snapshot exists and succeeded
    CheckToday,
    /// Delete snapshots older than the given number of days
    Prune {
        #[arg(long)]
        ttl_days: i64,
    },
}
