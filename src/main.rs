use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_tos_monitor::cli::{Cli, Commands};
use a3s_tos_monitor::MonitorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) if !path.exists() => {
            anyhow::bail!("config file not found: {}", path.display());
        }
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::load_default()?,
    };

    match cli.command {
        Commands::Run => {
            a3s_tos_monitor::cli::run::execute(&config).await?;
        }
        Commands::Check { creditor } => {
            a3s_tos_monitor::cli::check::execute(&creditor, &config).await?;
        }
        Commands::Rules => {
            a3s_tos_monitor::cli::rules::execute(&config)?;
        }
        Commands::History { creditor, limit } => {
            a3s_tos_monitor::cli::history::execute(&creditor, limit, &config).await?;
        }
        Commands::Verify { creditor } => {
            a3s_tos_monitor::cli::verify::execute(&creditor, &config).await?;
        }
    }

    Ok(())
}
