use anyhow::Context;
use clap::{Parser, Subcommand};
use imdb_etl::config::{Config, DEFAULT_CONFIG_PATH};
use imdb_etl::constants;
use imdb_etl::db::SqliteStore;
use imdb_etl::logging;
use imdb_etl::pipeline::orchestrator::run_once;
use imdb_etl::pipeline::Pipeline;
use imdb_etl::scheduler::Scheduler;
use imdb_etl::sources::{HttpFetcher, SourceFetcher};
use imdb_etl::storage::TableStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "imdb_etl")]
#[command(about = "Clean and merge the IMDb title basics and ratings datasets")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline once
    Run,
    /// Run a single step against the tables already in the store
    Stage {
        /// One of: db_connection, extract_data, impute_values, transform_datatypes, dedupe_tconst
        name: String,
    },
    /// Check that the storage backend is reachable
    Check,
    /// Run the pipeline on the workflow interval, one run at a time
    Schedule {
        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(HttpFetcher::new(config.sources.timeout())?);

    match cli.command {
        Commands::Run => {
            let report = run_once(&config, fetcher).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stage { name } => {
            let pipeline = Pipeline::from_config(&config, fetcher)?;
            let store = SqliteStore::connect(&config.storage.url)?;
            let step = pipeline.run_step(&name, &store).await?;
            println!("{}", serde_json::to_string_pretty(&step)?);
        }
        Commands::Check => {
            let store = SqliteStore::connect(&config.storage.url)?;
            store.ping().await?;
            info!("Storage backend at {} is reachable", config.storage.url);
            println!("✅ {} reachable", config.storage.url);
        }
        Commands::Schedule { max_runs } => {
            let scheduler = Scheduler::from_config(&config.workflow);
            info!(
                "📅 Scheduling '{}' every {} minutes with steps {:?}",
                config.workflow.name,
                config.workflow.interval_minutes,
                constants::get_step_names()
            );
            let summary = scheduler
                .run(|| run_once(&config, fetcher.clone()), max_runs)
                .await;
            if summary.failed > 0 {
                error!("{} of {} scheduled runs failed", summary.failed, summary.succeeded + summary.failed);
            }
            println!("Runs succeeded: {}, failed: {}", summary.succeeded, summary.failed);
        }
    }
    Ok(())
}
