use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_provider::ProviderBuilder;
use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use contract_log_backfill::indexer::rpc::AlloyRpc;
use contract_log_backfill::indexer::{Backfill, ContractJob, Mode, PipelineSettings};
use contract_log_backfill::metrics::Metrics;
use contract_log_backfill::models::common::parse_address;
use contract_log_backfill::storage::dune::DuneClient;
use contract_log_backfill::utils::load_config;

#[derive(Parser, Debug)]
#[command(version, about = "Backfill a contract's event logs into a Dune table")]
struct Cli {
    /// Path to the YAML config
    #[arg(long, short, default_value = "config.yml", global = true)]
    config: PathBuf,

    /// Only process the contract with this address
    #[arg(long, global = true)]
    contract: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Fetch logs, write the CSV, then upload it
    Run,
    /// Fetch logs and write the CSV only
    Backfill,
    /// Upload CSVs written by an earlier backfill
    Upload,
}

impl From<Command> for Mode {
    fn from(command: Command) -> Self {
        match command {
            Command::Run => Mode::Run,
            Command::Backfill => Mode::Backfill,
            Command::Upload => Mode::Upload,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    println!();
    info!("=========================== INITIALIZING ===========================");

    let config = match load_config(&cli.config) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(e);
        }
    };

    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new(config.chain_name.clone())?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    // Ctrl+C and the optional run deadline both stop the pipeline at its next checkpoint
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, initiating shutdown...");
            ctrl_c.cancel();
        }
    });
    if let Some(timeout_secs) = config.pipeline.run_timeout_secs {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
            warn!("Run timeout of {}s reached, shutting down...", timeout_secs);
            deadline.cancel();
        });
    }

    let rpc_url: Url = config.rpc.endpoint().parse()?;
    info!("RPC URL: {}", config.rpc.url);
    let provider = ProviderBuilder::new().connect_http(rpc_url);
    let rpc = Arc::new(AlloyRpc::new(provider, metrics.clone()));
    let dune = Arc::new(DuneClient::new(&config.dune)?);

    let settings = PipelineSettings::from(&config);
    let wanted = cli.contract.as_deref().map(parse_address).transpose()?;
    let jobs = config
        .contracts
        .iter()
        .map(|contract| ContractJob::from_config(contract, &settings))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|job| wanted.is_none_or(|wanted| job.address == wanted))
        .collect::<Vec<_>>();

    if jobs.is_empty() {
        return Err(anyhow!("no configured contract matches the selection"));
    }

    let pipeline = Backfill::new(rpc, dune, settings, metrics, cancel.clone());
    let mode = Mode::from(cli.command);

    println!();
    info!("======================== STARTING {:?} ========================", mode);

    let started = Instant::now();
    let mut failed = 0;
    for job in &jobs {
        if cancel.is_cancelled() {
            warn!("Skipping {} after shutdown", job.table);
            failed += 1;
            continue;
        }

        let contract_started = Instant::now();
        let outcome = pipeline.run_contract(job, mode).await;
        if !outcome.is_success() {
            failed += 1;
        }
        info!(
            "Finished {:#x} in {:.2} minutes",
            outcome.address,
            contract_started.elapsed().as_secs_f64() / 60.0
        );
    }

    info!(
        "Processed {} contract(s), {} failed, in {:.2} minutes",
        jobs.len(),
        failed,
        started.elapsed().as_secs_f64() / 60.0
    );

    if failed > 0 {
        return Err(anyhow!("{failed} of {} contract(s) failed", jobs.len()));
    }
    Ok(())
}

