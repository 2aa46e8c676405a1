//! Quorum node CLI
//!
//! Runs an in-process devnet and inspects node configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::LedgerConfig;
use ledger_node::{Devnet, NodeConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quorum-node")]
#[command(about = "Quorum ledger node - tick consensus over a replicated ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path; a four computor devnet when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run computors spread over in-process nodes
    Devnet {
        /// Number of nodes
        #[arg(short, long, default_value = "4")]
        nodes: usize,

        /// Ticks to run before stopping
        #[arg(short, long, default_value = "10")]
        ticks: u32,

        /// Seconds to wait for the ticks
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Print the effective configuration
    ShowConfig,

    /// Print every computor identity
    Keys,
}

fn load_config(path: Option<&PathBuf>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => NodeConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::devnet(4, Vec::new()),
    };
    config.merge_with_env()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Devnet { nodes, ticks, timeout } => {
            let devnet = Devnet::launch(&config, nodes)?;
            let start = devnet.statuses().iter().map(|status| status.tick).min().unwrap_or(0);
            let reached = devnet
                .wait_for_tick(start + ticks, Duration::from_secs(timeout))
                .await;
            let statuses = devnet.statuses();
            devnet.shutdown().await?;

            println!("{}", serde_json::to_string_pretty(&statuses)?);
            if !reached {
                anyhow::bail!("devnet did not reach tick {} within {timeout}s", start + ticks);
            }
        }

        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::Keys => {
            let roster = config.roster()?;
            for (index, key) in roster.keys.iter().enumerate() {
                println!("{index:>4} {key}");
            }
        }
    }

    Ok(())
}
