mod cli;
mod output;
mod store;

use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use patchwatch::{
    load_sources, summarize, FetcherOptions, HttpFetcher, Ingestor, PatchFilter, PatchRecord,
    SourceType,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, FetchArgs, ListArgs};
use output::{formatter, FetchSummary};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries results only.
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbosity.tracing_level_filter().into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if cli.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store_path = cli.store.as_path();
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Fetch(args) => fetch(args, store_path, cli.json, &mut stdout).await,
        Command::List(args) => list(args, store_path, cli.json, &mut stdout),
        Command::Status { id, status, notes } => {
            let mut collection = store::load(store_path)?;
            if !collection.set_status(&id, status) {
                bail!("no tracked patch with id {id:?}");
            }
            if let Some(notes) = notes {
                collection.amend_notes(&id, notes);
            }
            store::save(store_path, &collection)?;
            info!(%id, %status, "status updated");
            Ok(())
        }
        Command::Import { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut collection = store::load(store_path)?;
            let summary = collection
                .import_json(&text)
                .with_context(|| format!("failed to import {}", file.display()))?;
            store::save(store_path, &collection)?;
            println!("{} imported, {} already tracked", summary.added, summary.skipped);
            Ok(())
        }
        Command::Export { output } => {
            let json = store::load(store_path)?.export_json()?;
            match output {
                Some(path) => fs::write(&path, json + "\n")
                    .with_context(|| format!("failed to write {}", path.display())),
                None => {
                    println!("{json}");
                    Ok(())
                }
            }
        }
        Command::Remove { id } => {
            let mut collection = store::load(store_path)?;
            if collection.remove(&id).is_none() {
                bail!("no tracked patch with id {id:?}");
            }
            store::save(store_path, &collection)?;
            info!(%id, "patch removed");
            Ok(())
        }
    }
}

async fn fetch(
    args: FetchArgs,
    store_path: &Path,
    json: bool,
    out: &mut dyn std::io::Write,
) -> Result<()> {
    let text = fs::read_to_string(&args.sources)
        .with_context(|| format!("failed to read {}", args.sources.display()))?;
    let mut sources = load_sources(&text)
        .with_context(|| format!("invalid sources file {}", args.sources.display()))?;

    if !args.only.is_empty() {
        if let Some(missing) = args.only.iter().find(|n| !sources.iter().any(|s| &s.name == *n)) {
            bail!("no source named {missing:?} in {}", args.sources.display());
        }
        sources.retain(|s| args.only.contains(&s.name));
    }

    let token = args
        .token
        .or_else(|| env::var("GITHUB_TOKEN").ok())
        .filter(|t| !t.is_empty());
    if token.is_none() && sources.iter().any(|s| s.source_type == SourceType::Api) {
        warn!("no token provided; api sources will be queried anonymously");
    }

    let fetcher = HttpFetcher::new(FetcherOptions {
        token,
        timeout: Some(Duration::from_secs(args.timeout)),
        relay: args.relay,
    })?;
    let ingestor = Ingestor::builder(fetcher)
        .max_concurrency(args.max_concurrency)
        .build();

    let shared = store::load(store_path)?.into_shared();
    let merges = ingestor.ingest_into(&sources, &shared).await?;

    let collection = shared.lock().await;
    store::save(store_path, &collection)?;

    let total = summarize(merges.iter().map(|m| &m.merge));
    info!(added = total.added, skipped = total.skipped, tracked = collection.len(), "fetch complete");

    let summary = FetchSummary {
        sources: &merges,
        total,
        tracked: collection.len(),
    };
    formatter(json).write_fetch(&summary, out)?;
    Ok(())
}

fn list(args: ListArgs, store_path: &Path, json: bool, out: &mut dyn std::io::Write) -> Result<()> {
    let collection = store::load(store_path)?;
    let filter = PatchFilter {
        severity: args.severity,
        status: args.status,
        tool: args.tool,
    };
    let records: Vec<&PatchRecord> = collection.filter(&filter).collect();
    formatter(json).write_records(&records, out)?;
    Ok(())
}
