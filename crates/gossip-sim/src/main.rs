mod events;
mod node;
mod sim;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gossip_store::StoreConfig;

#[derive(Parser)]
#[command(name = "gossip-sim", about = "In-process simulation of gossip payload stores")]
struct Cli {
    /// Store configuration (JSON). Defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run N nodes, publish trades from both counterparties, report convergence.
    Run {
        /// Number of nodes.
        #[arg(long, default_value = "8")]
        nodes: usize,
        /// Nodes without the trade-statistics capability.
        #[arg(long, default_value = "2")]
        legacy: usize,
        /// Number of trades to publish.
        #[arg(long, default_value = "50")]
        trades: usize,
        /// RNG seed.
        #[arg(long, default_value = "42")]
        seed: u64,
        /// After convergence, advance the clock this many days and sweep.
        #[arg(long, default_value = "0")]
        advance_days: u64,
        /// Persist each node to SQLite under this directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Convergence rounds before giving up.
        #[arg(long, default_value = "100")]
        max_rounds: u32,
    },

    /// Print the effective store configuration as JSON.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };

    match cli.command {
        Command::Run {
            nodes,
            legacy,
            trades,
            seed,
            advance_days,
            data_dir,
            max_rounds,
        } => {
            anyhow::ensure!(nodes >= 2, "need at least 2 nodes");
            anyhow::ensure!(legacy <= nodes, "--legacy cannot exceed --nodes");
            if let Some(dir) = &data_dir {
                std::fs::create_dir_all(dir)?;
            }

            eprintln!("gossip-sim v{}", env!("CARGO_PKG_VERSION"));
            let converged = sim::run(sim::SimConfig {
                nodes,
                legacy,
                trades,
                seed,
                advance_days,
                data_dir,
                max_rounds,
                store: config,
            })
            .await?;

            if !converged {
                anyhow::bail!("nodes did not converge");
            }
        }

        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
