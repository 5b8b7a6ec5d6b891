use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use utxoracle::config::{Config, LoggingSettings, NodeSettings};
use utxoracle::core::{OracleError, OracleResult};
use utxoracle::ingest::{NodeDataSource, RpcNodeClient};
use utxoracle::util::display;
use utxoracle::{ChainStatus, PriceEstimate, PriceOracle};

#[derive(Parser, Debug)]
#[command(name = "utxoracle", about = "Estimate the daily BTC/USD price from on-chain data")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bitcoin Core RPC endpoint, e.g. http://127.0.0.1:8332
    #[arg(long)]
    rpc_url: Option<String>,

    #[arg(long)]
    rpc_user: Option<String>,

    #[arg(long)]
    rpc_password: Option<String>,

    /// bitcoind .cookie file for RPC authentication
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Estimate a single date (YYYY-MM-DD) and exit instead of prompting
    #[arg(short, long)]
    date: Option<String>,

    /// Print each estimate as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)?,
            None => Config::default(),
        };
        if let Some(url) = &self.rpc_url {
            config.node.rpc_url = url.clone();
        }
        if let Some(user) = &self.rpc_user {
            config.node.rpc_user = Some(user.clone());
        }
        if let Some(password) = &self.rpc_password {
            config.node.rpc_password = Some(password.clone());
        }
        if let Some(cookie) = &self.cookie_file {
            config.node.cookie_file = Some(cookie.clone());
        }
        Ok(config)
    }
}

fn init_tracing(settings: &LoggingSettings) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&settings.directory)
        .with_context(|| format!("creating log directory {}", settings.directory.display()))?;

    let file_appender = tracing_appender::rolling::daily(&settings.directory, &settings.file_prefix);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.default_filter)),
        )
        .init();

    // File output is flushed when the guard drops at the end of main
    Ok(guard)
}

async fn estimate_input<S>(
    oracle: &PriceOracle<'_, S>,
    input: &str,
    status: &ChainStatus,
) -> OracleResult<PriceEstimate>
where
    S: NodeDataSource + ?Sized,
{
    let date = oracle.resolve_date(input, status)?;
    println!("\nEstimating {} ...", date);
    oracle.estimate(date, |progress| display::print_block_progress(progress)).await
}

fn show_estimate(estimate: &PriceEstimate, json: bool) -> Result<()> {
    if json {
        println!("{}", display::estimate_json(estimate)?);
    } else {
        display::print_estimate(estimate);
    }
    Ok(())
}

async fn run_once<S>(oracle: &PriceOracle<'_, S>, input: &str, json: bool) -> Result<()>
where
    S: NodeDataSource + ?Sized,
{
    let status = oracle.chain_status().await?;
    display::print_chain_status(&status);
    let estimate = estimate_input(oracle, input, &status).await?;
    show_estimate(&estimate, json)
}

/// Prompts until `q` or end of input. Operator-fixable errors re-prompt; any
/// other error ends the session and is returned.
async fn run_prompt_loop<S, R>(oracle: &PriceOracle<'_, S>, input: R, json: bool) -> Result<()>
where
    S: NodeDataSource + ?Sized,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let status = oracle.chain_status().await?;
        display::print_chain_status(&status);
        display::print_prompt_help();
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            info!("input closed");
            break;
        };
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }

        match estimate_input(oracle, &line, &status).await {
            Ok(estimate) => show_estimate(&estimate, json)?,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "estimate not possible for input");
                display::print_recoverable(&e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Operator-facing report for an error that ended the session
fn report_failure(failure: &anyhow::Error, node: &NodeSettings) {
    error!(error = %failure, "session ended");
    match failure.downcast_ref::<OracleError>() {
        Some(e) if e.is_recoverable() => display::print_recoverable(e),
        Some(e) => {
            display::print_fatal(e);
            if matches!(e, OracleError::DataSource(_)) {
                display::print_node_hint(&node.rpc_url);
            }
        }
        None => eprintln!("{:#}", failure),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let _guard = init_tracing(&config.logging)?;

    let calibration = config.load_calibration()?;
    info!(version = calibration.version, "calibration loaded");

    let client = RpcNodeClient::new(&config.node).context("configuring node RPC client")?;
    let oracle = PriceOracle::new(&client, &calibration, config.oracle.earliest_date);

    display::print_banner();

    let outcome = match &cli.date {
        Some(input) => run_once(&oracle, input, cli.json).await,
        None => run_prompt_loop(&oracle, BufReader::new(tokio::io::stdin()), cli.json).await,
    };
    if let Err(failure) = &outcome {
        report_failure(failure, &config.node);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use utxoracle::{Calibration, InMemoryChain};

    fn earliest() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2023, 12, 15).unwrap()
    }

    #[tokio::test]
    async fn test_node_failure_at_prompt_ends_session_with_oracle_error() {
        // No blocks: the chain height query fails before the first prompt
        let chain = InMemoryChain::new();
        let oracle = PriceOracle::new(&chain, Calibration::builtin(), earliest());

        let failure = run_prompt_loop(&oracle, &b"2023-12-20\n"[..], false)
            .await
            .unwrap_err();
        let oracle_error = failure.downcast_ref::<OracleError>().unwrap();
        assert!(matches!(oracle_error, OracleError::DataSource(_)));
        assert!(!oracle_error.is_recoverable());
    }

    #[tokio::test]
    async fn test_bad_input_reprompts_until_quit() {
        let chain = InMemoryChain::from_timestamps(&[1_702_598_400, 1_702_684_800, 1_702_771_200]);
        let oracle = PriceOracle::new(&chain, Calibration::builtin(), earliest());

        run_prompt_loop(&oracle, &b"yesterday\n2020-01-01\nq\n"[..], false)
            .await
            .unwrap();
        run_prompt_loop(&oracle, &b""[..], false).await.unwrap();
    }
}
