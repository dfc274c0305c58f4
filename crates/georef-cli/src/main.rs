//! georef CLI
//!
//! Commands:
//! - `import`: load a legacy SQL dump into the reference store
//! - `inspect`: list the tables and parse diagnostics of a dump
//! - `config`: print the default import configuration

mod report;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use georef_import::{CancelToken, ImportConfig, Pipeline};
use georef_ingest_sql::DumpIndex;
use georef_storage::{JsonFileStore, MemoryStore, Store};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "georef")]
#[command(author, version, about = "Hierarchical geographic reference data import")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import states, LGAs, wards and polling units from a SQL dump
    Import(ImportArgs),

    /// Show which tables a dump inserts into, with parse diagnostics
    Inspect {
        /// SQL dump file
        dump: PathBuf,
    },

    /// Print the default import configuration as JSON
    Config,
}

#[derive(Args)]
struct ImportArgs {
    /// SQL dump file
    dump: PathBuf,

    /// JSON store file (created if missing)
    #[arg(long, required_unless_present = "dry_run")]
    store: Option<PathBuf>,

    /// Import configuration (JSON); defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the configured write concurrency
    #[arg(long)]
    concurrency: Option<usize>,

    /// Stop starting new batches after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Write the run summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Exit with status 2 when any row was skipped
    #[arg(long)]
    strict: bool,

    /// Import into a throwaway in-memory store
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Import(args) => cmd_import(args),
        Commands::Inspect { dump } => cmd_inspect(&dump).map(|_| ExitCode::SUCCESS),
        Commands::Config => cmd_config().map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_import(args: ImportArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => ImportConfig::load(path)?,
        None => ImportConfig::default(),
    };
    if let Some(n) = args.batch_size {
        config.batch_size = n;
    }
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if args.deadline_secs.is_some() {
        config.deadline_secs = args.deadline_secs;
    }

    let store: Arc<dyn Store> = match (&args.store, args.dry_run) {
        (_, true) => Arc::new(MemoryStore::new()),
        (Some(path), false) => Arc::new(
            JsonFileStore::open(path)
                .with_context(|| format!("opening store {}", path.display()))?,
        ),
        (None, false) => return Err(anyhow!("--store is required unless --dry-run is given")),
    };

    println!("{} {}", "Importing".green().bold(), args.dump.display());
    match &args.store {
        Some(path) if !args.dry_run => println!("  {} {}", "→".cyan(), path.display()),
        _ => println!("  {} {}", "→".cyan(), "dry run (in-memory store)".dimmed()),
    }

    let pipeline = Pipeline::new(store, config.clone())?;
    let cancel = CancelToken::new();
    let pipeline = pipeline.with_cancel(cancel.clone());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to start tokio runtime: {e}"))?;

    let summary = rt.block_on(async {
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing the current batch");
                cancel.cancel();
            }
        });
        let result = pipeline.run_file(&args.dump).await;
        watcher.abort();
        result
    })?;

    report::print_summary(&summary, &config);

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing summary {}", path.display()))?;
        println!("  {} summary written to {}", "→".cyan(), path.display());
    }

    if !summary.is_success() {
        return Ok(ExitCode::FAILURE);
    }
    if args.strict && summary.total_skipped() > 0 {
        println!(
            "{} {} row(s) skipped",
            "strict:".yellow().bold(),
            summary.total_skipped()
        );
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_inspect(dump: &Path) -> Result<()> {
    let bytes = std::fs::read(dump).with_context(|| format!("reading {}", dump.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let index = DumpIndex::build(&text);

    println!("{} {}", "Inspecting".green().bold(), dump.display());
    let tables = index.tables();
    if tables.is_empty() {
        println!("  {}", "no INSERT statements found".yellow());
        return Ok(());
    }
    for table in tables {
        let rows = index.extract(table);
        println!("{}", report::inspect_line(&rows));
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let json = serde_json::to_string_pretty(&ImportConfig::default())?;
    println!("{json}");
    Ok(())
}
