use clap::{Parser, Subcommand};
use corebank::config::Config;
use corebank::service::Bank;
use corebank::workload::{demo_scenario, simulate};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "corebank", version, about = "Event-sourced core-banking engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scripted demo scenario and print final account balances
    Demo,
    /// Run a randomized command workload against a fresh node
    Simulate {
        /// Number of commands to generate
        #[arg(short, long, default_value = "200", value_name = "COUNT")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corebank=info")),
        )
        .init();

    let config = Config::from_env();
    let bank = Bank::boot(config).await?;

    match Cli::parse().command {
        Some(Commands::Simulate { count }) => simulate(&bank, count).await?,
        Some(Commands::Demo) | None => demo_scenario(&bank).await?,
    }

    bank.shutdown().await;
    Ok(())
}
