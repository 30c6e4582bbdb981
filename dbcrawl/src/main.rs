//! Relational catalog crawler.
//!
//! Walks every database, schema, table and view a catalog exposes, writes
//! the normalized entities to a JSON-lines file and, when a state directory
//! is given, emits removal signals for entities that disappeared since the
//! previous run.
//!
//! # Guarantees
//! - Read-only catalog access
//! - Connection strings are redacted in every log line
//! - An interrupted run never updates the checkpoint

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use dbcrawl_core::{
    CrawlConfig, CrawlContext, Crawler, JsonFileCheckpointStore, JsonLinesSink,
    adapters::create_adapter, error::redact_database_url, logging::init_logging,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dbcrawl")]
#[command(about = "Relational catalog crawler")]
#[command(version)]
#[command(long_about = "
dbcrawl - Relational catalog crawler

Extracts databases, schemas, tables, views and columns from a catalog,
normalizes them into stable identifiers and writes them as JSON lines.

STATEFUL RUNS:
  With --state-dir, each run saves the set of entities it saw. The next
  run of the same --job-id emits removal signals for entities that are
  gone. Set stateful_ingestion.fail_safe_on_failures in the config file
  to skip removal whenever a table or schema failed.

SUPPORTED CATALOGS:
- SQLite (sqlite:// or .db/.sqlite/.sqlite3 files)

EXAMPLES:
  dbcrawl --database-url sqlite:///data/warehouse.db
  dbcrawl --config crawl.json --state-dir .dbcrawl --output entities.jsonl
  dbcrawl test --database-url ./warehouse.sqlite
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    crawl: CrawlArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the catalog (default)
    Crawl,
    /// Test the catalog connection
    Test,
}

#[derive(Args)]
struct CrawlArgs {
    /// Catalog connection URL
    #[arg(
        long,
        env = "DATABASE_URL",
        global = true,
        help = "Catalog connection string (credentials are redacted in logs)"
    )]
    database_url: Option<String>,

    /// JSON crawl configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output file path
    #[arg(
        short,
        long,
        global = true,
        default_value = "dbcrawl.jsonl",
        help = "JSON-lines file the work units are written to"
    )]
    output: PathBuf,

    /// Checkpoint directory; enables stale-entity removal
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Job identifier checkpoints are keyed by
    #[arg(long, global = true)]
    job_id: Option<String>,

    /// Platform instance prefixed to every identifier
    #[arg(long, global = true)]
    platform_instance: Option<String>,

    /// Environment tag (e.g. PROD, DEV)
    #[arg(long, global = true)]
    env: Option<String>,

    /// Profile eligible tables
    #[arg(long, global = true)]
    profile: bool,

    /// Concurrent profiling workers
    #[arg(long, global = true)]
    max_workers: Option<usize>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let Some(database_url) = cli.crawl.database_url.as_deref() else {
        bail!("Database URL is required (--database-url or DATABASE_URL)");
    };

    match cli.command {
        Some(Command::Test) => test_connection(database_url).await,
        Some(Command::Crawl) | None => crawl(database_url, &cli.crawl).await,
    }
}

/// Loads the configuration file, if any, and applies flag overrides.
fn build_config(args: &CrawlArgs) -> anyhow::Result<CrawlConfig> {
    let mut config = match &args.config {
        Some(path) => CrawlConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CrawlConfig::default(),
    };

    if let Some(job_id) = &args.job_id {
        config = config.with_job_id(job_id.clone());
    }
    if let Some(instance) = &args.platform_instance {
        config = config.with_platform_instance(instance.clone());
    }
    if let Some(env) = &args.env {
        config = config.with_env(env.clone());
    }
    if args.state_dir.is_some() {
        config = config.with_stateful_ingestion(true);
    }
    if args.profile {
        config.profiling.enabled = true;
    }
    if let Some(workers) = args.max_workers {
        config.profiling = config.profiling.with_max_workers(workers)?;
    }

    config.validate()?;
    Ok(config)
}

/// Crawls the catalog and writes work units to the output file.
async fn crawl(database_url: &str, args: &CrawlArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;

    info!("Starting catalog crawl...");
    info!("Target: {}", redact_database_url(database_url));
    info!("Output: {}", args.output.display());

    let adapter = create_adapter(database_url).await.map_err(|e| {
        error!("Failed to create catalog adapter: {}", e);
        e
    })?;
    let sink = JsonLinesSink::create(&args.output).await?;
    let store = args.state_dir.as_ref().map(JsonFileCheckpointStore::new);

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next schema boundary");
                cancel.cancel();
            }
        }
    });

    let mut ctx = CrawlContext::new(adapter.inspector.as_ref(), &sink).with_cancellation(cancel);
    if let Some(store) = &store {
        ctx = ctx.with_checkpoints(store);
    }
    if let Some(profiler) = &adapter.profiler {
        ctx = ctx.with_profiler(profiler.as_ref());
    }

    let mut crawler = Crawler::new(config)?;
    let result = crawler.run(ctx).await;
    interrupt.abort();
    let report = result.context("Crawl failed")?;

    info!("✓ Crawl completed");
    println!("{}", report);
    println!("Output: {}", args.output.display());
    if let Some(store) = &store {
        println!("Checkpoint: {}", store.path_for(&crawler.config().job_id).display());
    }
    if !report.failures.is_empty() {
        warn!("{} failures recorded during the crawl", report.failures.len());
    }

    Ok(())
}

/// Opens every database the catalog lists without crawling.
async fn test_connection(database_url: &str) -> anyhow::Result<()> {
    info!("Testing catalog connection...");

    let adapter = create_adapter(database_url).await.map_err(|e| {
        error!("Failed to create catalog adapter: {}", e);
        e
    })?;
    let inspector = adapter.inspector.as_ref();
    info!("Created {} adapter", inspector.platform());

    let databases = inspector.list_databases().await?;
    for database in &databases {
        let session = inspector
            .connect(database)
            .await
            .with_context(|| format!("Failed to open database '{}'", database))?;
        let schemas = session.list_schemas().await?;
        session.close().await?;
        info!("Database '{}': {} schemas", database, schemas.len());
    }

    println!(
        "Connection to {} catalog successful ({} databases)",
        inspector.platform(),
        databases.len()
    );
    Ok(())
}
