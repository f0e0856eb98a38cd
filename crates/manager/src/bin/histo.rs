//! histo: scheduled ingestion into a versioned SQLite store.
//!
//! Subcommands:
//! - `run`: run the scheduler from a schedule file (or every job once)
//! - `run-job`: run one job now
//! - `history`: print recent history events as JSON lines
//! - `jobs`: list registered jobs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use histo_core::config::load_dotenv;
use histo_core::Config;
use histo_manager::{run_all_once, run_scheduler, JobExecutor, JobRegistry, RetryPolicy, ScheduleFile};
use histo_sources::{SourceParams, SourceRegistry};
use histo_store::VersionedStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled ingestion with SCD2 history.
#[derive(Parser, Debug)]
#[command(name = "histo", version, about)]
struct Cli {
    /// SQLite database path.
    #[arg(long, global = true, env = "HISTO_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run jobs on the schedule from a schedule file.
    Run {
        /// Schedule file (JSON).
        #[arg(long, env = "HISTO_SCHEDULE_PATH")]
        schedule: Option<PathBuf>,

        /// Run every enabled entry once and exit.
        #[arg(long)]
        once: bool,
    },

    /// Run one job immediately.
    RunJob {
        job: String,

        /// Source parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,

        /// Retries after a failed attempt.
        #[arg(long, default_value_t = 0)]
        max_retries: u32,

        /// Initial retry backoff in milliseconds.
        #[arg(long, default_value_t = 1_000)]
        retry_backoff_ms: u64,
    },

    /// Print the most recent history events, newest first.
    History {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// List registered jobs.
    Jobs,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.store.db_path = db;
    }

    let jobs = JobRegistry::standard();

    match cli.command {
        Command::Jobs => {
            for job in jobs.iter() {
                println!(
                    "{}\tsource={}\ttable={}\tkeys={}",
                    job.name,
                    job.source,
                    job.table,
                    job.key_fields.join(",")
                );
            }
        }
        Command::History { limit } => {
            let store = open_store(&config)?;
            for event in store.fetch_recent(limit).context("failed to read history")? {
                println!("{}", serde_json::to_string(&event)?);
            }
            close_store(store)?;
        }
        Command::RunJob {
            job,
            params,
            max_retries,
            retry_backoff_ms,
        } => {
            let params = parse_params(params.as_deref())?;
            let store = open_store(&config)?;
            let executor = build_executor(&config, store.clone(), jobs)?;
            let retry = RetryPolicy {
                max_retries,
                backoff: Duration::from_millis(retry_backoff_ms),
            };
            let result = executor.run(&job, &params, &retry).await;
            drop(executor);
            close_store(store)?;

            let outcome = result.with_context(|| format!("job '{job}' failed"))?;
            info!(
                job = %outcome.job,
                fetched = outcome.fetched,
                inserted = outcome.inserted,
                duration_ms = outcome.duration_ms,
                "done"
            );
        }
        Command::Run { schedule, once } => {
            let path = schedule.unwrap_or_else(|| config.scheduler.schedule_path.clone());
            let schedule = ScheduleFile::load(&path, &jobs)
                .with_context(|| format!("failed to load schedule {}", path.display()))?;
            info!(path = %path.display(), entries = schedule.entries.len(), "loaded schedule");

            let store = open_store(&config)?;
            let executor = Arc::new(build_executor(&config, store.clone(), jobs)?);
            let mut failed = 0usize;
            if once {
                for (name, result) in run_all_once(&executor, &schedule).await {
                    if let Err(e) = result {
                        error!(entry = %name, error = %e, "entry failed");
                        failed += 1;
                    }
                }
            } else {
                run_scheduler(executor.clone(), &schedule, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "failed to listen for ctrl-c");
                    }
                })
                .await;
            }
            drop(executor);
            close_store(store)?;

            if failed > 0 {
                anyhow::bail!("{failed} schedule entries failed");
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<VersionedStore>> {
    config.log_summary();
    let store = VersionedStore::open_configured(&config.store)
        .with_context(|| format!("failed to open store at {}", config.store.db_path.display()))?;
    Ok(Arc::new(store))
}

fn close_store(store: Arc<VersionedStore>) -> Result<()> {
    match Arc::try_unwrap(store) {
        Ok(store) => store.close().context("failed to close store"),
        Err(_) => {
            warn!("store still shared at exit, dropping without close");
            Ok(())
        }
    }
}

fn build_executor(config: &Config, store: Arc<VersionedStore>, jobs: JobRegistry) -> Result<JobExecutor> {
    let sources = SourceRegistry::from_config(config).context("failed to initialise sources")?;
    info!(sources = ?sources.names(), "sources ready");
    Ok(JobExecutor::new(store, Arc::new(sources), Arc::new(jobs)))
}

fn parse_params(raw: Option<&str>) -> Result<SourceParams> {
    let Some(raw) = raw else {
        return Ok(SourceParams::new());
    };
    let value: serde_json::Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--params must be a JSON object"),
    }
}
