use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Subcommand;

use crate::{AppConfig, AppError};

mod inspect;
mod receive;
mod send;

/// Everything went as planned.
pub const EXIT_SUCCESS: i32 = 0;
/// A configuration or I/O error stopped the command.
pub const EXIT_FATAL: i32 = 1;
/// The transfer stopped early but its state is safe on disk.
pub const EXIT_INTERRUPTED: i32 = 2;

#[derive(Debug, Subcommand)]
pub enum Commands {
    Send(send::SendFile),
    Receive(receive::Receive),
    Inspect(inspect::Inspect),
}

impl Commands {
    pub async fn run(&self, config: &AppConfig) -> Result<i32, AppError> {
        match self {
            Commands::Send(send) => send.run(config).await,
            Commands::Receive(receive) => receive.run(config).await,
            Commands::Inspect(inspect) => inspect.run(config),
        }
    }
}

/// A flag raised once the operator presses Ctrl+C.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::debug!("Interrupt received");
            raised.store(true, Ordering::Release);
        }
    });
    flag
}
