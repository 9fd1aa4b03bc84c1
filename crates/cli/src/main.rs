//! Cache Probe CLI - scripted cache scenarios.
//!
//! # Usage
//!
//! ```bash
//! # List scenarios
//! cache-probe demo list
//!
//! # Run a scenario against a server on localhost:8081
//! cache-probe demo run loading-state
//!
//! # Run a scenario against an in-process server
//! cache-probe demo run connection-directive --serve
//! ```
//!
//! # Commands
//!
//! - `demo list` - Show available scenarios
//! - `demo run` - Run one scenario and print its event log

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cache_probe_client::{ClientConfig, ProbeClient, probe_type_policies};
use cache_probe_server::{AppState, LocalServer};

use commands::demo::Scenario;

mod commands;

#[derive(Parser)]
#[command(name = "cache-probe")]
#[command(author, version, about = "Cache Probe CLI tools")]
struct Cli {
    /// GraphQL endpoint (defaults to `CACHE_PROBE_ENDPOINT`, then
    /// `http://localhost:8081/graphql`)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cache scenarios
    Demo {
        #[command(subcommand)]
        action: DemoAction,
    },
}

#[derive(Subcommand)]
enum DemoAction {
    /// List available scenarios
    List,
    /// Run a scenario and print its event log
    Run {
        #[arg(value_enum)]
        scenario: Scenario,

        /// Start an in-process server instead of using the endpoint
        #[arg(long)]
        serve: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Demo { action } => match action {
            DemoAction::List => list(),
            DemoAction::Run { scenario, serve } => {
                let server = if serve {
                    Some(LocalServer::spawn(AppState::new()).await?)
                } else {
                    None
                };
                let config = match (&server, &cli.endpoint) {
                    (Some(server), _) => ClientConfig::with_endpoint(&server.graphql_url())?,
                    (None, Some(endpoint)) => ClientConfig::with_endpoint(endpoint)?,
                    (None, None) => ClientConfig::from_env()?,
                };
                tracing::info!(endpoint = %config.endpoint, "connecting");

                let client = ProbeClient::new(&config, probe_type_policies());
                scenario.run(&client).await?.print();
            }
        },
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn list() {
    for scenario in Scenario::ALL {
        println!("{:<22} {}", scenario.name(), scenario.description());
    }
}
