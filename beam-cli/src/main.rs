use clap::Parser;

mod cli;
mod commands;
mod config;
mod display;
mod error;
mod progress;
mod qr;
mod source;

use crate::cli::Cli;
use crate::commands::EXIT_FATAL;
pub use crate::config::AppConfig;
pub use crate::error::AppError;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Cli::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(args: Cli) -> Result<i32, AppError> {
    let config =
        AppConfig::load().map_err(|e| AppError::ConfigError(format!("{:#}", e)))?;
    log::debug!("Using configuration {:?}", config);
    args.command.run(&config).await
}
