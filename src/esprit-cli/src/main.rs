use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use esprit::tasks::{self, CopyOptions};
use esprit::{BulkLoadOptions, Client, PageOptions, ScrollOptions, SnapshotClient};
use esprit_core::chunking::split_bulk_file;
use esprit_core::Config;

mod cli;
mod telemetry;

use cli::{Cli, Commands, SnapshotCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = telemetry::init_telemetry()?;

    let config = load_config(&cli);
    tracing::info!(
        host = %config.host,
        index = ?config.index,
        version = %config.es_version,
        "esprit starting"
    );

    match &cli.command {
        Commands::Split(args) => {
            let max_bytes = args.max_bytes.unwrap_or(config.bulk.max_chunk_bytes);
            let written = split_bulk_file(&args.file, &args.out, max_bytes)
                .with_context(|| format!("splitting {}", args.file.display()))?;
            for path in &written {
                println!("{}", path.display());
            }
            tracing::info!(files = written.len(), "split complete");
        }
        Commands::Load(args) => {
            let client = Client::new(config.connection())?;
            let options = BulkLoadOptions {
                limit: args.limit,
                max_chunk_bytes: args.max_bytes.unwrap_or(config.bulk.max_chunk_bytes),
                rewrite_index: args.rewrite_index.clone(),
            };
            let report = client.bulk_load(&args.doc_type, &args.file, &options).await?;
            tracing::info!(chunks = report.chunks, records = report.records, "load complete");
        }
        Commands::Dump(args) => {
            let client = Client::new(config.connection())?;
            let page_size = args.page_size.unwrap_or(config.scroll.page_size);
            let stdout = std::io::stdout();
            let mut out = stdout.lock();

            let written = if args.scroll {
                let mut options = ScrollOptions::default()
                    .with_page_size(page_size)
                    .with_keepalive(config.scroll.keepalive.clone());
                options.keyword_subfield = config.scroll.keyword_subfield.clone();
                options.limit = args.limit;
                let mut records = client.scroll(&[&args.doc_type], None, options);
                let mut written = 0;
                while let Some(record) = records.next().await? {
                    serde_json::to_writer(&mut out, &record)?;
                    out.write_all(b"\n")?;
                    written += 1;
                }
                out.flush()?;
                written
            } else {
                let options = PageOptions {
                    page_size,
                    limit: args.limit,
                    keyword_subfield: config.scroll.keyword_subfield.clone(),
                    ..PageOptions::default()
                };
                tasks::dump(&client, &args.doc_type, None, options, &mut out, None).await?
            };
            tracing::info!(records = written, "dump complete");
        }
        Commands::Copy(args) => {
            let source = Client::new(config.connection())?;
            let target_conn = config
                .connection()
                .with_indexes(vec![args.target_index.clone()]);
            let target = Client::new(target_conn)?;
            let target_type = args.target_type.as_deref().unwrap_or(&args.doc_type);
            let options = CopyOptions {
                batch_size: args.batch_size.unwrap_or(config.bulk.batch_size),
                limit: args.limit,
                ..CopyOptions::default()
            };
            let copied =
                tasks::copy(&source, &args.doc_type, &target, target_type, None, &options).await?;
            tracing::info!(records = copied, target = %args.target_index, "copy complete");
        }
        Commands::Snapshots(args) => {
            let client = Client::new(config.connection())?;
            let mut snapshots = SnapshotClient::from_client(&client, &args.repo);
            match &args.command {
                SnapshotCommands::List => {
                    for s in snapshots.list_snapshots().await? {
                        println!("{}\t{}\t{}", s.datetime.to_rfc3339(), s.state, s.name);
                    }
                }
                SnapshotCommands::CheckToday => {
                    snapshots.check_today_snapshot().await?;
                    println!("today's snapshot is present and succeeded");
                }
                SnapshotCommands::Prune { ttl_days } => {
                    let mut report = |s: &esprit::Snapshot, ok: bool| {
                        tracing::info!(snapshot = %s.name, deleted = ok, "pruned snapshot");
                    };
                    snapshots.prune_snapshots(*ttl_days, Some(&mut report)).await?;
                }
            }
        }
    }

    Ok(())
}

/// Config file merged with command line overrides. A missing or unreadable
/// file falls back to defaults.
fn load_config(cli: &Cli) -> Config {
    let mut config = match Config::load(&cli.config.to_string_lossy()) {
        Ok(config) => config,
        Err(e) => {
            if Path::new(&cli.config).exists() {
                tracing::warn!(error = %e, "failed to load {}, using defaults", cli.config.display());
            }
            Config::default()
        }
    };
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(index) = &cli.index {
        config.index = vec![index.clone()];
    }
    config
}
