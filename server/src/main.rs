//! rMemory Entry Point
//!
//! Commands:
//! - `index`: run the indexing daemon until Ctrl-C
//! - `index-once`: run a single indexing cycle
//! - `summarize`: run the tiered summary pipeline once
//! - `report`: print summary tier statistics
//! - `fixed-version`: resolve the fixed version for a CVE

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hextrackr_memory::summary::{
    JsonRawRecordStore, JsonSummaryStore, OllamaSummarizer, TieredSummaryPipeline,
};
use hextrackr_memory::OllamaEmbedder;
use hextrackr_rmemory::{
    load_config, AdvisoryVersionCache, Config, DaemonResult, HexTrackrAdvisoryClient, IndexDaemon,
};

#[derive(Parser)]
#[command(name = "rmemory")]
#[command(about = "HexTrackr rMemory indexer, summarizer and advisory lookups")]
#[command(version)]
struct Args {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index new evidence and notes until interrupted
    Index,
    /// Run one indexing cycle and exit
    IndexOnce,
    /// Summarize high-value records and roll up project summaries
    Summarize,
    /// Print summary tier statistics
    Report,
    /// Resolve the fixed version for a CVE
    FixedVersion {
        #[arg(long)]
        cve: String,
        #[arg(long)]
        vendor: String,
        /// Installed software version, used to pick a matching train
        #[arg(long)]
        installed: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hextrackr_rmemory=info,hextrackr_memory=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> DaemonResult<()> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Index => {
            let mut daemon = open_daemon(&config)?;
            let cancel = shutdown_token();
            daemon.run(cancel).await
        }
        Command::IndexOnce => {
            let mut daemon = open_daemon(&config)?;
            let report = daemon.run_once(&shutdown_token()).await?;
            println!(
                "embedded={} retried={} pending_retry={} records={} edges={}",
                report.embedded,
                report.retried,
                report.failed,
                report.total_records,
                report.total_edges
            );
            Ok(())
        }
        Command::Summarize => {
            let pipeline = open_pipeline(&config)?;
            let report = pipeline.run(&shutdown_token()).await?;
            tracing::info!(
                "Selected {} records in {} batches: {} summarized, {} skipped, {} project summaries",
                report.selected,
                report.batches,
                report.summarized,
                report.skipped,
                report.project_summaries
            );
            print_json(&pipeline.memory_report()?)
        }
        Command::Report => {
            let pipeline = open_pipeline(&config)?;
            print_json(&pipeline.memory_report()?)
        }
        Command::FixedVersion {
            cve,
            vendor,
            installed,
        } => {
            let client =
                HexTrackrAdvisoryClient::new(&config.advisory.base_url, config.advisory.timeout())?;
            let cache = AdvisoryVersionCache::new(
                Arc::new(client),
                config.advisory.to_cache_config(),
            );
            match cache
                .get_fixed_version(&cve, &vendor, installed.as_deref())
                .await
            {
                Some(version) => println!("{}", version),
                None => println!("no fixed version found"),
            }
            tracing::debug!("Cache stats: {:?}", cache.stats());
            Ok(())
        }
    }
}

fn open_daemon(config: &Config) -> DaemonResult<IndexDaemon> {
    let embedder = OllamaEmbedder::new(config.embedding.to_embedder_config())?;
    IndexDaemon::from_config(config, Arc::new(embedder))
}

fn open_pipeline(config: &Config) -> DaemonResult<TieredSummaryPipeline> {
    let raw = JsonRawRecordStore::new(config.paths.raw_records_path());
    let store = JsonSummaryStore::open(config.paths.summary_store_path())?;
    let summarizer = OllamaSummarizer::new(config.summarizer.to_summarizer_config())?;
    Ok(TieredSummaryPipeline::new(
        Arc::new(raw),
        Arc::new(store),
        Arc::new(summarizer),
        config.summarizer.to_pipeline_config(),
    ))
}

/// Token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn print_json<T: serde::Serialize>(value: &T) -> DaemonResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(hextrackr_memory::MemoryError::from)?;
    println!("{}", json);
    Ok(())
}
