//! # Outreach — scheduling and lead selection CLI
//!
//! Runs per-site sweeps against the SQLite store and inspects what the
//! scheduler would do.
//!
//! Usage:
//!   outreach --config ./outreach.toml init          # Write default config
//!   outreach sweep --job-type daily_prospection     # One sweep, JSON report
//!   outreach sweep --job-type email_sync --watch 300  # JSON line per selected task
//!   outreach search --site acme                     # Dry-run lead search
//!   outreach route customer_reply --priority low
//!   outreach status --site acme --job-type daily_prospection

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use outreach_core::OutreachConfig;
use outreach_leads::{CandidatePaginator, SearchParams};
use outreach_scheduler::{JobRegistry, OutreachEngine, PriorityTaskRouter, SweepOptions};
use outreach_store::SqliteStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "outreach",
    version,
    about = "📬 Outreach — job scheduling, stuck-run recovery and lead selection"
)]
struct Cli {
    /// Config file (default: ~/.outreach/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (overrides [store] path)
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file (to --config if given) if none exists
    Init,

    /// Sweep every active site for one job type
    Sweep {
        #[arg(long)]
        job_type: String,
        /// Lane override: critical, high, normal, low, background
        #[arg(long)]
        priority: Option<String>,
        /// Schedule every site that has a valid channel
        #[arg(long)]
        force: bool,
        /// Keep sweeping every N seconds until Ctrl-C
        #[arg(long)]
        watch: Option<u64>,
    },

    /// Run the lead search for one site without touching job status
    Search {
        #[arg(long)]
        site: String,
    },

    /// Show the lane a job type resolves to
    Route {
        job_type: String,
        #[arg(long)]
        priority: Option<String>,
    },

    /// Show the stored job status for a site
    Status {
        #[arg(long)]
        site: String,
        #[arg(long)]
        job_type: String,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(cli: &Cli) -> Result<OutreachConfig> {
    let mut config = match &cli.config {
        Some(path) => OutreachConfig::load_from(&expand_path(path))?,
        None => OutreachConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }
    Ok(config)
}

/// Write the default config to `--config` (or the default path) unless one exists.
fn init_config(cli: &Cli) -> Result<()> {
    let path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(OutreachConfig::default_path);
    if path.exists() {
        println!("⚠️  Config already exists at {}", path.display());
        return Ok(());
    }
    let mut config = OutreachConfig::default();
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }
    config.save_to(&path)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

fn open_store(config: &OutreachConfig) -> Result<Arc<SqliteStore>> {
    let path = expand_path(&config.store.path);
    let store = SqliteStore::open(Path::new(&path))
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "outreach=debug,outreach_core=debug,outreach_leads=debug,outreach_scheduler=debug,outreach_store=debug"
    } else {
        "outreach=info,outreach_core=info,outreach_leads=info,outreach_scheduler=info,outreach_store=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Init => init_config(&cli)?,

        Command::Sweep {
            job_type,
            priority,
            force,
            watch,
        } => {
            let config = load_config(&cli)?;
            let store = open_store(&config)?;
            let engine = Arc::new(OutreachEngine::new(store, config));
            let mut options = SweepOptions::new(job_type);
            if let Some(p) = priority {
                options = options.with_priority(p);
            }
            if *force {
                options = options.forced();
            }

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("🛑 Ctrl-C received, stopping");
                    ctrl_c.cancel();
                }
            });

            match watch {
                Some(secs) => {
                    // One JSON line per selected task, until Ctrl-C.
                    let (tx, mut rx) = mpsc::channel(256);
                    let sweeper = tokio::spawn(outreach_scheduler::spawn_sweeper(
                        engine.clone(),
                        options,
                        Duration::from_secs((*secs).max(1)),
                        cancel,
                        tx,
                    ));
                    while let Some(task) = rx.recv().await {
                        println!("{}", serde_json::to_string(&task)?);
                    }
                    sweeper.await.context("sweeper task")?;
                }
                None => {
                    let report = engine.run_sweep(&options, &cancel).await?;
                    print_json(&report)?;
                }
            }
        }

        Command::Search { site } => {
            let config = load_config(&cli)?;
            let store = open_store(&config)?;
            let paginator = CandidatePaginator::from_config(store, &config);
            let params = SearchParams::from_config(site, &config.leads);
            let outcome = paginator.search(&params, &CancellationToken::new()).await?;
            print_json(&outcome)?;
        }

        Command::Route { job_type, priority } => {
            let router = PriorityTaskRouter::new(JobRegistry::builtin());
            let route = router.route_named(job_type, priority.as_deref());
            print_json(&route)?;
        }

        Command::Status { site, job_type } => {
            let config = load_config(&cli)?;
            let store = open_store(&config)?;
            let engine = OutreachEngine::new(store, config);
            match engine.tracker().get(site, job_type).await? {
                Some(record) => print_json(&record)?,
                None => println!("No job status recorded for {site}/{job_type}"),
            }
        }
    }

    Ok(())
}
