use crate::{
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::LoaderConfig;
use engine_runtime::execution::executor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "streamload",
    version = "0.1.0",
    about = "Loads tokenized event batches into a warehouse table"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let code = match run(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            error!(error = %err, "streamload failed");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run { config, once } => {
            let mut config = LoaderConfig::load(&config)?;
            if once {
                config.source.follow = false;
            }

            let shutdown = ShutdownCoordinator::new(CancellationToken::new());
            shutdown.register_handlers();

            let snapshot = executor::run(config, shutdown.cancel_token()).await?;
            if let Some(signal) = shutdown.received() {
                info!(%signal, "Stopped after shutdown request");
            }
            output::print_summary(&snapshot);
        }
        Commands::Validate { config } => {
            info!(config = %config, "Validating loader config");
            LoaderConfig::load(&config)?;
            println!("Configuration '{config}' is valid");
        }
    }

    Ok(())
}
