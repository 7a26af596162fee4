//! # Cluster Inspector
//!
//! Command line entry point for the two read paths of the SDK:
//!
//! - `cluster`: current state and required balance of one cluster
//! - `operators`: registered / nonregistered partition for a set of wallets
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin cluster_inspector -- cluster --owner 0xabc... --operators 1,2,3,4
//! cargo run --bin cluster_inspector -- operators --user 0xabc... --user 0xdef...
//! ```
//!
//! JSON goes to stdout, a colored summary to stderr. Ctrl+C cancels a
//! running scan between windows.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dvt_cluster_sdk::{
    metrics, ChainReader, ClusterDetails, ClusterSource, ClusterStateResolver,
    NetworkOperatorSource, OperatorAggregator, ProviderChainReader, Settings, UserOperators,
};
use dvt_cluster_sdk::types::conversions::string_to_address;
use ethers::types::Address;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "cluster_inspector", about = "Inspect DVT clusters and operators")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,

    /// Stop the backward scan after this many windows
    #[arg(long)]
    max_windows: Option<u64>,

    /// Wall-clock budget for one scan, in seconds
    #[arg(long)]
    deadline_seconds: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve the current state of one cluster
    Cluster {
        #[arg(long, value_parser = parse_address)]
        owner: Address,
        /// Comma-separated operator ids, in any order
        #[arg(long, value_delimiter = ',', required = true)]
        operators: Vec<u64>,
        /// Also compute the deposit needed to add this many validators
        #[arg(long, default_value_t = 0)]
        additional_validators: u32,
    },
    /// Partition a user's operators into registered and nonregistered
    Operators {
        #[arg(long = "user", required = true, value_parser = parse_address)]
        users: Vec<Address>,
    },
}

fn parse_address(raw: &str) -> Result<Address, String> {
    string_to_address(raw).map_err(|e| e.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<T: Serialize> {
    generated_at: String,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterReport {
    #[serde(flatten)]
    details: ClusterDetails,
    additional_validators: u32,
    required_deposit: Option<ethers::types::U256>,
}

fn print_json<T: Serialize>(body: T) -> Result<()> {
    let report = Report {
        generated_at: chrono::Utc::now().to_rfc3339(),
        body,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn init_logging(settings: &Settings) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log.level))
        .init();
    Ok(())
}

#[cfg(feature = "observability")]
fn init_logging(settings: &Settings) -> Result<()> {
    let level: tracing::Level = settings
        .log
        .level
        .parse()
        .with_context(|| format!("invalid log level {}", settings.log.level))?;
    if settings.log.json {
        tracing_subscriber::fmt().json().with_max_level(level).init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .context("failed to install Prometheus exporter")?;
    Ok(())
}

fn summarize_cluster(details: &ClusterDetails, deposit: Option<ethers::types::U256>) {
    let state = if details.cluster.active {
        "active".green()
    } else {
        "liquidated".red()
    };
    let origin = match &details.source {
        ClusterSource::Event {
            kind, block_number, ..
        } => format!("{} @ {}", kind, block_number),
        ClusterSource::Default => "no history (new cluster)".yellow().to_string(),
    };
    eprintln!(
        "📦 Cluster {} | validators: {} | balance: {}",
        state, details.cluster.validator_count, details.cluster.balance
    );
    eprintln!("   source: {}", origin);
    eprintln!(
        "   required balance per validator: {}",
        details.required_balance_per_validator.to_string().bold()
    );
    if let Some(deposit) = deposit {
        eprintln!("   deposit needed: {}", deposit.to_string().bold());
    }
}

fn summarize_operators(result: &UserOperators) {
    eprintln!(
        "👥 {} registered, {} nonregistered, {} skipped (block {})",
        result.registered.len().to_string().green(),
        result.nonregistered.len().to_string().yellow(),
        result.skipped.len().to_string().red(),
        result.as_of_block
    );
    for op in &result.registered {
        eprintln!(
            "   ✅ #{} 0x{}… pools: {}",
            op.id(),
            hex::encode(op.operator.public_key.iter().take(6).copied().collect::<Vec<u8>>()),
            op.pools.len()
        );
    }
    for skipped in &result.skipped {
        eprintln!("   ⚠️ #{} skipped: {}", skipped.id, skipped.reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = Settings::from_path(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if cli.max_windows.is_some() {
        settings.scanner.max_windows = cli.max_windows;
    }
    if cli.deadline_seconds.is_some() {
        settings.scanner.deadline_seconds = cli.deadline_seconds;
    }

    init_logging(&settings)?;
    metrics::describe_metrics();

    let reader: Arc<dyn ChainReader> = Arc::new(ProviderChainReader::from_settings(&settings.rpc)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("🛑 Cancelling after the current window...");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Cluster {
            owner,
            operators,
            additional_validators,
        } => {
            let resolver = ClusterStateResolver::from_settings(reader, &settings)
                .with_cancellation(cancel);
            let details = resolver.get_cluster_details(&operators, owner).await?;
            let deposit = details.required_deposit(additional_validators);
            summarize_cluster(&details, deposit);
            print_json(ClusterReport {
                details,
                additional_validators,
                required_deposit: deposit,
            })?;
        }
        Command::Operators { users } => {
            let source = Arc::new(NetworkOperatorSource::from_settings(
                reader.clone(),
                settings.contracts.network,
                &settings.operator_source,
            ));
            let aggregator = OperatorAggregator::from_settings(source, reader, &settings);
            let result = aggregator.get_user_operators(&users).await?;
            summarize_operators(&result);
            print_json(result)?;
        }
    }

    Ok(())
}
