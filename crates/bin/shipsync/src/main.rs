use std::process::ExitCode;

use clap::Parser;
use shipsync::{
    commands,
    config::{Cli, Command},
};

#[tokio::main]
async fn main() -> ExitCode {
    monitoring::logging::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Fill(config) => commands::fill::run(config).await,
        Command::Monitor(config) => commands::monitor::run(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "shipsync_failed");
            ExitCode::FAILURE
        }
    }
}
