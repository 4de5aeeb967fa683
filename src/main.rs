mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pos_assistant::config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pos-assistant",
    version,
    about = "Retrieval-augmented assistant for point-of-sale staff"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Mirror customers and products from the transactional store
    Sync {
        /// Re-embed every product, even unchanged ones
        #[arg(long)]
        force: bool,
    },
    /// Ask one question through the full chat pipeline
    Ask {
        #[arg(long)]
        seller: i64,
        #[arg(long)]
        customer: Option<i64>,
        /// Print session and feedback details to stderr
        #[arg(short, long)]
        verbose: bool,
        message: String,
    },
    /// Print product recommendations
    Recommend {
        #[arg(long)]
        customer: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Check database health and configuration
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::AssistantConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            pos_assistant::server::serve(config).await?;
        }
        Command::Sync { force } => {
            cli::sync::sync(&config, force).await?;
        }
        Command::Ask {
            seller,
            customer,
            verbose,
            message,
        } => {
            cli::ask::ask(&config, seller, customer, message, verbose).await?;
        }
        Command::Recommend {
            customer,
            limit,
            json,
        } => {
            cli::recommend::recommend(&config, customer, limit, json).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
