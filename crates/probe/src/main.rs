use anyhow::Result;
use clap::Parser;
use prtg_mcp_sdk::DiscoveryMode;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

mod checks;
mod config;
mod output;

use checks::{Runner, Suite};
use config::{Overrides, ProbeConfig};
use output::Console;

#[derive(Parser, Debug)]
#[command(name = "mcp-probe")]
#[command(about = "Diagnostic client for MCP Server PRTG", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mcp-probe.toml")]
    config: PathBuf,

    /// Base URL of the server
    #[arg(short, long, env = "MCP_PROBE_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token
    #[arg(short = 'k', long, env = "MCP_PROBE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Accept self-signed certificates
    #[arg(long)]
    insecure: bool,

    /// How the server announces the message endpoint (auto, query-session, endpoint-event)
    #[arg(short, long)]
    mode: Option<DiscoveryMode>,

    /// Checks to run
    #[arg(short, long, value_enum, default_value = "full")]
    suite: Suite,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Run the MCP initialize exchange after discovery
    #[arg(long)]
    initialize: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log SDK activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.verbose {
        "prtg_mcp_sdk=debug,mcp_probe=debug,warn"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let console = Console::detect(args.no_color);

    match until_interrupted(run(args, console), tokio::signal::ctrl_c()).await {
        Outcome::Finished(Ok(true)) => ExitCode::SUCCESS,
        Outcome::Finished(Ok(false)) => ExitCode::from(1),
        Outcome::Finished(Err(e)) => {
            console.error(&format!("Fatal error: {e:#}"));
            ExitCode::from(1)
        }
        Outcome::Interrupted => {
            println!();
            console.warning("Tests interrupted by user");
            ExitCode::from(130)
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Finished(Result<bool>),
    Interrupted,
}

/// Race the checks against an interrupt.
///
/// An interrupt future that fails (no signal handler could be installed) is
/// ignored and the checks run to completion.
async fn until_interrupted<W, I>(work: W, interrupt: I) -> Outcome
where
    W: Future<Output = Result<bool>>,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = work => Outcome::Finished(result),
        Ok(()) = interrupt => Outcome::Interrupted,
    }
}

async fn run(args: Args, console: Console) -> Result<bool> {
    let mut config = ProbeConfig::load(&args.config)?;
    config.apply(Overrides {
        base_url: args.base_url,
        api_key: args.api_key,
        insecure: args.insecure,
        mode: args.mode,
        timeout_secs: args.timeout,
        initialize: args.initialize,
    });

    let client = config.build_client()?;

    console.banner("MCP Server PRTG - Client Test Suite");
    console.info(&format!("Target: {}", client.config().base_url));
    console.info(&format!("API Key: {}", config.masked_api_key()));

    tracing::debug!(suite = ?args.suite, "Running checks");
    let runner = Runner::new(&client, console, &config.checks);
    let outcomes = runner.run(args.suite).await;

    let results: Vec<(&str, bool)> = outcomes.iter().map(|o| (o.name, o.passed)).collect();
    console.summary(&results);

    Ok(outcomes.iter().all(|o| o.passed))
}
